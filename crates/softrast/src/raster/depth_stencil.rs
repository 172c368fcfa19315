//! Per-sample depth and stencil testing
//!
//! Vulkan ordering: the stencil test runs first and applies its fail
//! operation; surviving samples take the depth test, which applies the pass
//! or depth-fail stencil operation and optionally commits depth.

use crate::pipeline::state::{DepthState, StencilOpState, StencilState};
use crate::raster::attachment::AttachmentView;

/// Inputs for testing one sample.
pub struct SampleTest<'a> {
    /// Depth attachment, if bound.
    pub depth_target: Option<&'a AttachmentView>,
    /// Stencil attachment, if bound.
    pub stencil_target: Option<&'a AttachmentView>,
    /// Depth-test state.
    pub depth_state: &'a DepthState,
    /// Stencil state.
    pub stencil_state: &'a StencilState,
    /// Facing of the primitive being shaded.
    pub front_facing: bool,
}

impl SampleTest<'_> {
    fn face(&self) -> &StencilOpState {
        if self.front_facing {
            &self.stencil_state.front
        } else {
            &self.stencil_state.back
        }
    }

    /// Tests one sample, applying stencil updates and the depth write.
    ///
    /// Returns whether the sample survives both tests.
    pub fn test(&self, x: u32, y: u32, sample: u32, depth_value: f32) -> bool {
        let stencil_enabled = self.stencil_state.enabled && self.stencil_target.is_some();

        if stencil_enabled {
            let face = self.face();
            let target = self.stencil_target.unwrap();
            let stored = target.read_stencil(x, y, sample);
            let reference = face.reference as u8;
            let pass = face.compare_op.compare_u32(
                u32::from(reference) & face.compare_mask,
                u32::from(stored) & face.compare_mask,
            );
            if !pass {
                let updated = face.fail_op.apply(stored, reference);
                target.write_stencil(x, y, sample, updated, face.write_mask as u8);
                return false;
            }
        }

        let depth_pass = if self.depth_state.test_enable {
            match self.depth_target {
                Some(target) => {
                    let stored = target.read_depth(x, y, sample);
                    self.depth_state
                        .compare_op
                        .compare_f32(depth_value.clamp(0.0, 1.0), stored)
                }
                None => true,
            }
        } else {
            true
        };

        if stencil_enabled {
            let face = self.face();
            let target = self.stencil_target.unwrap();
            let stored = target.read_stencil(x, y, sample);
            let reference = face.reference as u8;
            let op = if depth_pass {
                face.pass_op
            } else {
                face.depth_fail_op
            };
            let updated = op.apply(stored, reference);
            target.write_stencil(x, y, sample, updated, face.write_mask as u8);
        }

        if depth_pass && self.depth_state.write_enable {
            if let Some(target) = self.depth_target {
                target.write_depth(x, y, sample, depth_value.clamp(0.0, 1.0));
            }
        }

        depth_pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::{CompareOp, StencilOp};
    use crate::raster::attachment::{Format, ImageBuffer};

    fn depth_image(initial: f32) -> ImageBuffer {
        let image = ImageBuffer::new(Format::Depth32Float, 2, 2, 1);
        let view = image.view();
        for y in 0..2 {
            for x in 0..2 {
                view.write_depth(x, y, 0, initial);
            }
        }
        image
    }

    #[test]
    fn depth_test_rejects_and_keeps_the_stored_value() {
        let image = depth_image(0.5);
        let view = image.view();
        let depth_state = DepthState {
            test_enable: true,
            write_enable: true,
            compare_op: CompareOp::Less,
        };
        let stencil_state = StencilState::default();
        let test = SampleTest {
            depth_target: Some(&view),
            stencil_target: None,
            depth_state: &depth_state,
            stencil_state: &stencil_state,
            front_facing: true,
        };
        assert!(!test.test(0, 0, 0, 0.75));
        assert_eq!(view.read_depth(0, 0, 0), 0.5);
        assert!(test.test(0, 0, 0, 0.25));
        assert_eq!(view.read_depth(0, 0, 0), 0.25);
    }

    #[test]
    fn depth_write_disabled_leaves_the_buffer() {
        let image = depth_image(0.5);
        let view = image.view();
        let depth_state = DepthState {
            test_enable: true,
            write_enable: false,
            compare_op: CompareOp::Less,
        };
        let stencil_state = StencilState::default();
        let test = SampleTest {
            depth_target: Some(&view),
            stencil_target: None,
            depth_state: &depth_state,
            stencil_state: &stencil_state,
            front_facing: true,
        };
        assert!(test.test(0, 0, 0, 0.25));
        assert_eq!(view.read_depth(0, 0, 0), 0.5);
    }

    #[test]
    fn stencil_fail_op_applies_and_rejects() {
        let stencil = ImageBuffer::new(Format::Stencil8, 2, 2, 1);
        let view = stencil.view();
        let depth_state = DepthState::default();
        let mut stencil_state = StencilState {
            enabled: true,
            ..StencilState::default()
        };
        stencil_state.front.compare_op = CompareOp::Equal;
        stencil_state.front.reference = 5;
        stencil_state.front.fail_op = StencilOp::Replace;
        let test = SampleTest {
            depth_target: None,
            stencil_target: Some(&view),
            depth_state: &depth_state,
            stencil_state: &stencil_state,
            front_facing: true,
        };
        // Stored 0 != reference 5: fails and replaces.
        assert!(!test.test(1, 1, 0, 0.0));
        assert_eq!(view.read_stencil(1, 1, 0), 5);
        // Now it matches and passes.
        assert!(test.test(1, 1, 0, 0.0));
    }

    #[test]
    fn back_faces_use_the_back_ops() {
        let stencil = ImageBuffer::new(Format::Stencil8, 1, 1, 1);
        let view = stencil.view();
        let depth_state = DepthState::default();
        let mut stencil_state = StencilState {
            enabled: true,
            ..StencilState::default()
        };
        stencil_state.back.pass_op = StencilOp::IncrementAndClamp;
        let test = SampleTest {
            depth_target: None,
            stencil_target: Some(&view),
            depth_state: &depth_state,
            stencil_state: &stencil_state,
            front_facing: false,
        };
        assert!(test.test(0, 0, 0, 0.0));
        assert_eq!(view.read_stencil(0, 0, 0), 1);
    }
}
