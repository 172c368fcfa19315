//! The per-cluster pixel engine
//!
//! Walks a primitive's bounding rectangle restricted to one cluster strip in
//! 2×2 quads, tests sample coverage against the edge equations, interpolates
//! attributes, invokes the pixel routine, applies depth-stencil and
//! blending, and stores the surviving samples.
//!
//! Early depth-stencil runs before the routine whenever the routine neither
//! discards nor writes depth; rejected samples never reach the routine.

use crate::foundation::math::{to_fixed, Vec4};
use crate::pipeline::routine::{PixelRoutine, QuadArgs, MAX_ATTRIBUTES};
use crate::pipeline::state::{BlendState, DepthState, StencilState, MAX_COLOR_TARGETS};
use crate::raster::attachment::AttachmentView;
use crate::raster::blend::{blend, BlendInputs};
use crate::raster::depth_stencil::SampleTest;
use crate::raster::primitive::{cluster_rows, AttributePlanes, Primitive, Rect};
use crate::raster::sample::positions;
use crate::raster::Scissor;

/// Everything a pixel task binds for rasterization.
pub struct PixelParams<'a> {
    /// The pixel-stage routine.
    pub routine: &'a dyn PixelRoutine,
    /// Bound colour targets.
    pub color_targets: &'a [AttachmentView],
    /// Bound depth target.
    pub depth_target: Option<&'a AttachmentView>,
    /// Bound stencil target.
    pub stencil_target: Option<&'a AttachmentView>,
    /// Depth-test state.
    pub depth_state: DepthState,
    /// Stencil state.
    pub stencil_state: StencilState,
    /// Per-target blend state.
    pub blend: [BlendState; MAX_COLOR_TARGETS],
    /// Blend constant colour.
    pub blend_constants: [f32; 4],
    /// Scissor rectangle.
    pub scissor: Scissor,
    /// Target width in pixels.
    pub target_width: u32,
    /// Target height in pixels.
    pub target_height: u32,
    /// Samples per pixel.
    pub sample_count: u32,
    /// Push-constant bytes for the routine.
    pub push_constants: &'a [u8],
}

/// Rasterizes one primitive within one cluster strip.
///
/// Returns the number of samples that passed the depth test, the occlusion
/// contribution of this invocation.
///
/// # Panics
///
/// Panics if the pixel routine widens its coverage mask; a routine may only
/// kill samples.
pub fn rasterize_cluster(primitive: &Primitive, cluster: usize, params: &PixelParams<'_>) -> u32 {
    let (strip_y0, strip_y1) = cluster_rows(params.target_height, cluster);
    let rect = primitive
        .bounds
        .intersect(&Rect {
            min: (params.scissor.x, params.scissor.y),
            max: (
                params.scissor.x + params.scissor.width as i32,
                params.scissor.y + params.scissor.height as i32,
            ),
        })
        .intersect(&Rect {
            min: (i32::MIN, strip_y0),
            max: (i32::MAX, strip_y1),
        });
    if rect.is_empty() {
        return 0;
    }

    let samples = positions(params.sample_count);
    let early = !params.routine.writes_depth() && !params.routine.may_discard();
    let mut occlusion = 0_u32;

    // Quads are aligned to even coordinates so neighbouring primitives agree
    // on quad boundaries.
    let qx0 = rect.min.0 & !1;
    let qy0 = rect.min.1 & !1;
    let mut qy = qy0;
    while qy < rect.max.1 {
        let mut qx = qx0;
        while qx < rect.max.0 {
            occlusion += shade_quad(primitive, qx, qy, &rect, samples, early, params);
            qx += 2;
        }
        qy += 2;
    }
    occlusion
}

fn shade_quad(
    primitive: &Primitive,
    qx: i32,
    qy: i32,
    rect: &Rect,
    samples: &[(f32, f32)],
    early: bool,
    params: &PixelParams<'_>,
) -> u32 {
    // Per-lane sample coverage from the edge equations.
    let mut coverage = [0_u32; 4];
    let mut any = false;
    for lane in 0..4 {
        let px = qx + (lane as i32 & 1);
        let py = qy + (lane as i32 >> 1);
        if px < rect.min.0 || px >= rect.max.0 || py < rect.min.1 || py >= rect.max.1 {
            continue;
        }
        for (si, (sx, sy)) in samples.iter().enumerate() {
            let fx = to_fixed(px as f32 + sx);
            let fy = to_fixed(py as f32 + sy);
            if primitive.edges.iter().all(|e| e.covers(fx, fy)) {
                coverage[lane] |= 1 << si;
                any = true;
            }
        }
    }
    if !any {
        return 0;
    }

    // Interpolation at pixel centres.
    let centre = |lane: usize| {
        (
            (qx + (lane as i32 & 1)) as f32 + 0.5,
            (qy + (lane as i32 >> 1)) as f32 + 0.5,
        )
    };
    let mut one_over_w = [0.0_f32; 4];
    let mut depth = [0.0_f32; 4];
    for lane in 0..4 {
        let (cx, cy) = centre(lane);
        one_over_w[lane] = primitive.one_over_w.eval(cx, cy).max(f32::MIN_POSITIVE);
        depth[lane] = primitive.depth.eval(cx, cy);
    }

    let mut attributes = [[Vec4::zeros(); 4]; MAX_ATTRIBUTES];
    let mut ddx = [Vec4::zeros(); MAX_ATTRIBUTES];
    let mut ddy = [Vec4::zeros(); MAX_ATTRIBUTES];
    for i in 0..primitive.attribute_count {
        match &primitive.attributes[i] {
            AttributePlanes::Flat(value) => {
                attributes[i] = [*value; 4];
            }
            AttributePlanes::Linear(planes) => {
                for lane in 0..4 {
                    let (cx, cy) = centre(lane);
                    for c in 0..4 {
                        attributes[i][lane][c] = planes[c].eval(cx, cy);
                    }
                }
                for c in 0..4 {
                    ddx[i][c] = planes[c].a;
                    ddy[i][c] = planes[c].b;
                }
            }
            AttributePlanes::Perspective(planes) => {
                for lane in 0..4 {
                    let (cx, cy) = centre(lane);
                    let rhw = one_over_w[lane];
                    for c in 0..4 {
                        attributes[i][lane][c] = planes[c].eval(cx, cy) / rhw;
                    }
                }
                // Derivatives are the plane gradients scaled by the quad's
                // top-left 1/w.
                for c in 0..4 {
                    ddx[i][c] = planes[c].a / one_over_w[0];
                    ddy[i][c] = planes[c].b / one_over_w[0];
                }
            }
        }
    }

    let sample_test = SampleTest {
        depth_target: params.depth_target,
        stencil_target: params.stencil_target,
        depth_state: &params.depth_state,
        stencil_state: &params.stencil_state,
        front_facing: primitive.front_facing,
    };
    let depth_stencil_bound =
        params.depth_state.test_enable || params.stencil_state.enabled;

    let mut occlusion = 0_u32;
    if early && depth_stencil_bound {
        for lane in 0..4 {
            let px = (qx + (lane as i32 & 1)) as u32;
            let py = (qy + (lane as i32 >> 1)) as u32;
            let mut surviving = 0_u32;
            for (si, (sx, sy)) in samples.iter().enumerate() {
                if coverage[lane] & (1 << si) == 0 {
                    continue;
                }
                let depth_value = if params.sample_count > 1 {
                    primitive.depth.eval(px as f32 + sx, py as f32 + sy)
                } else {
                    depth[lane]
                };
                if sample_test.test(px, py, si as u32, depth_value) {
                    surviving |= 1 << si;
                    occlusion += 1;
                }
            }
            coverage[lane] = surviving;
        }
        if coverage.iter().all(|&c| c == 0) {
            return occlusion;
        }
    }

    // Invoke the pixel routine.
    let input_coverage = coverage;
    let mut colors = [[Vec4::zeros(); 4]; MAX_COLOR_TARGETS];
    {
        let mut args = QuadArgs {
            x: qx,
            y: qy,
            attributes: &attributes[..primitive.attribute_count.max(1)],
            ddx: &ddx[..primitive.attribute_count.max(1)],
            ddy: &ddy[..primitive.attribute_count.max(1)],
            one_over_w,
            depth: &mut depth,
            coverage: &mut coverage,
            color: &mut colors,
            push_constants: params.push_constants,
        };
        params.routine.execute(&mut args);
    }
    for lane in 0..4 {
        assert!(
            coverage[lane] & !input_coverage[lane] == 0,
            "pixel routine widened its coverage mask at ({}, {})",
            qx + (lane as i32 & 1),
            qy + (lane as i32 >> 1),
        );
    }

    // Late depth-stencil, using routine-exported depth when present.
    if !early && depth_stencil_bound {
        for lane in 0..4 {
            let px = (qx + (lane as i32 & 1)) as u32;
            let py = (qy + (lane as i32 >> 1)) as u32;
            let mut surviving = 0_u32;
            for si in 0..samples.len() {
                if coverage[lane] & (1 << si) == 0 {
                    continue;
                }
                if sample_test.test(px, py, si as u32, depth[lane]) {
                    surviving |= 1 << si;
                    occlusion += 1;
                }
            }
            coverage[lane] = surviving;
        }
    } else if !depth_stencil_bound {
        // No depth-stencil: every covered sample counts as passing.
        for lane in 0..4 {
            occlusion += coverage[lane].count_ones();
        }
    }

    // Write back surviving samples.
    for lane in 0..4 {
        if coverage[lane] == 0 {
            continue;
        }
        let px = (qx + (lane as i32 & 1)) as u32;
        let py = (qy + (lane as i32 >> 1)) as u32;
        for (target_index, target) in params.color_targets.iter().enumerate() {
            let state = &params.blend[target_index.min(MAX_COLOR_TARGETS - 1)];
            for si in 0..samples.len() {
                if coverage[lane] & (1 << si) == 0 {
                    continue;
                }
                let dst = target.read_color(px, py, si as u32);
                let out = blend(
                    state,
                    &BlendInputs {
                        src: colors[target_index][lane],
                        src1: colors[1.min(MAX_COLOR_TARGETS - 1)][lane],
                        dst,
                        constants: params.blend_constants,
                    },
                );
                target.write_color(px, py, si as u32, out, state.write_mask);
            }
        }
    }

    occlusion
}
