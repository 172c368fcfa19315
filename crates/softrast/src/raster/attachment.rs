//! Attachment views and image storage
//!
//! An [`AttachmentView`] is a non-owning window onto colour, depth, or
//! stencil memory owned by the image layer: a base pointer, pitches, format,
//! and sample count, valid for the duration of the draws that bind it.
//!
//! This module is the only place the crate dereferences raw attachment
//! memory. Safety rests on the pipeline's ordering contract: within a draw,
//! each pixel task writes only its own cluster strip, and draws sharing an
//! attachment are serialized by the ticket chain.

use std::cell::UnsafeCell;

use crate::foundation::math::Vec4;
use crate::pipeline::state::ColorWriteMask;

/// Texel formats attachments can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// 8-bit UNORM red/green/blue/alpha.
    Rgba8Unorm,
    /// 8-bit UNORM blue/green/red/alpha.
    Bgra8Unorm,
    /// 32-bit float per channel.
    Rgba32Float,
    /// 32-bit float depth.
    Depth32Float,
    /// 8-bit stencil.
    Stencil8,
}

impl Format {
    /// Bytes per texel.
    #[must_use]
    pub const fn texel_bytes(self) -> usize {
        match self {
            Self::Stencil8 => 1,
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Depth32Float => 4,
            Self::Rgba32Float => 16,
        }
    }
}

fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// A non-owning view of one attachment.
///
/// The pointer and pitches come from the image layer; the view is valid for
/// as long as that layer keeps the backing image alive, which it guarantees
/// for the lifetime of any draw binding the view.
#[derive(Debug, Clone)]
pub struct AttachmentView {
    base: *mut u8,
    format: Format,
    width: u32,
    height: u32,
    row_pitch: usize,
    slice_pitch: usize,
    samples: u32,
}

// The image layer owns the memory; concurrent access is coordinated by the
// draw pipeline (disjoint cluster strips within a draw, tickets across
// draws).
unsafe impl Send for AttachmentView {}
unsafe impl Sync for AttachmentView {}

impl AttachmentView {
    /// Wraps externally owned memory.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `slice_pitch * samples` bytes (or
    /// `row_pitch * height` for single-sampled images) that stay valid and
    /// writable for the view's lifetime, and no access outside this crate's
    /// pipeline may alias writes to them while draws are in flight.
    #[must_use]
    pub const unsafe fn from_raw(
        base: *mut u8,
        format: Format,
        width: u32,
        height: u32,
        row_pitch: usize,
        slice_pitch: usize,
        samples: u32,
    ) -> Self {
        Self {
            base,
            format,
            width,
            height,
            row_pitch,
            slice_pitch,
            samples,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Samples per pixel.
    #[must_use]
    pub const fn samples(&self) -> u32 {
        self.samples
    }

    /// Texel format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    fn texel_ptr(&self, x: u32, y: u32, sample: u32) -> *mut u8 {
        debug_assert!(x < self.width && y < self.height && sample < self.samples);
        let offset = sample as usize * self.slice_pitch
            + y as usize * self.row_pitch
            + x as usize * self.format.texel_bytes();
        // Bounds were established by the caller's scissor/extent clamps.
        unsafe { self.base.add(offset) }
    }

    /// Reads a colour texel as linear RGBA.
    #[must_use]
    pub fn read_color(&self, x: u32, y: u32, sample: u32) -> Vec4 {
        let p = self.texel_ptr(x, y, sample);
        match self.format {
            Format::Rgba8Unorm => unsafe {
                Vec4::new(
                    f32::from(*p) / 255.0,
                    f32::from(*p.add(1)) / 255.0,
                    f32::from(*p.add(2)) / 255.0,
                    f32::from(*p.add(3)) / 255.0,
                )
            },
            Format::Bgra8Unorm => unsafe {
                Vec4::new(
                    f32::from(*p.add(2)) / 255.0,
                    f32::from(*p.add(1)) / 255.0,
                    f32::from(*p) / 255.0,
                    f32::from(*p.add(3)) / 255.0,
                )
            },
            Format::Rgba32Float => unsafe {
                let f = p.cast::<f32>();
                Vec4::new(*f, *f.add(1), *f.add(2), *f.add(3))
            },
            Format::Depth32Float | Format::Stencil8 => Vec4::zeros(),
        }
    }

    /// Writes a colour texel, honouring the channel write mask.
    pub fn write_color(&self, x: u32, y: u32, sample: u32, color: Vec4, mask: ColorWriteMask) {
        let p = self.texel_ptr(x, y, sample);
        let channels = [
            (ColorWriteMask::R, color.x),
            (ColorWriteMask::G, color.y),
            (ColorWriteMask::B, color.z),
            (ColorWriteMask::A, color.w),
        ];
        match self.format {
            Format::Rgba8Unorm => {
                for (i, (bit, v)) in channels.iter().enumerate() {
                    if mask.contains(*bit) {
                        unsafe { *p.add(i) = unorm8(*v) };
                    }
                }
            }
            Format::Bgra8Unorm => {
                let order = [2_usize, 1, 0, 3];
                for ((bit, v), byte) in channels.iter().zip(order) {
                    if mask.contains(*bit) {
                        unsafe { *p.add(byte) = unorm8(*v) };
                    }
                }
            }
            Format::Rgba32Float => {
                let f = p.cast::<f32>();
                for (i, (bit, v)) in channels.iter().enumerate() {
                    if mask.contains(*bit) {
                        unsafe { *f.add(i) = *v };
                    }
                }
            }
            Format::Depth32Float | Format::Stencil8 => {}
        }
    }

    /// Reads a depth sample.
    #[must_use]
    pub fn read_depth(&self, x: u32, y: u32, sample: u32) -> f32 {
        debug_assert_eq!(self.format, Format::Depth32Float);
        unsafe { *self.texel_ptr(x, y, sample).cast::<f32>() }
    }

    /// Writes a depth sample.
    pub fn write_depth(&self, x: u32, y: u32, sample: u32, depth: f32) {
        debug_assert_eq!(self.format, Format::Depth32Float);
        unsafe { *self.texel_ptr(x, y, sample).cast::<f32>() = depth };
    }

    /// Reads a stencil sample.
    #[must_use]
    pub fn read_stencil(&self, x: u32, y: u32, sample: u32) -> u8 {
        debug_assert_eq!(self.format, Format::Stencil8);
        unsafe { *self.texel_ptr(x, y, sample) }
    }

    /// Writes a stencil sample, honouring the write mask.
    pub fn write_stencil(&self, x: u32, y: u32, sample: u32, value: u8, write_mask: u8) {
        debug_assert_eq!(self.format, Format::Stencil8);
        let p = self.texel_ptr(x, y, sample);
        unsafe {
            *p = (*p & !write_mask) | (value & write_mask);
        }
    }
}

/// An owned image usable as an attachment.
///
/// Convenience storage for tests, demos, and the headless presenter; real
/// deployments wrap device memory with [`AttachmentView::from_raw`] instead.
pub struct ImageBuffer {
    data: UnsafeCell<Vec<u8>>,
    format: Format,
    width: u32,
    height: u32,
    samples: u32,
}

// Mutation happens only through views handed to the draw pipeline, which
// serializes conflicting access; see the module contract above.
unsafe impl Sync for ImageBuffer {}

impl ImageBuffer {
    /// Allocates a zeroed image.
    #[must_use]
    pub fn new(format: Format, width: u32, height: u32, samples: u32) -> Self {
        let size = format.texel_bytes() * (width * height * samples) as usize;
        Self {
            data: UnsafeCell::new(vec![0; size]),
            format,
            width,
            height,
            samples,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Texel format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// A view of the whole image for binding as an attachment.
    #[must_use]
    pub fn view(&self) -> AttachmentView {
        let row_pitch = self.format.texel_bytes() * self.width as usize;
        let slice_pitch = row_pitch * self.height as usize;
        unsafe {
            AttachmentView::from_raw(
                (*self.data.get()).as_mut_ptr(),
                self.format,
                self.width,
                self.height,
                row_pitch,
                slice_pitch,
                self.samples,
            )
        }
    }

    /// Copies the image contents out.
    ///
    /// Call only while no draws targeting this image are in flight.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        unsafe { (*self.data.get()).clone() }
    }

    /// Fills every byte of the image.
    ///
    /// Call only while no draws targeting this image are in flight.
    pub fn fill(&self, byte: u8) {
        unsafe {
            (*self.data.get()).fill(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_round_trips_through_rgba8() {
        let image = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 1);
        let view = image.view();
        view.write_color(2, 1, 0, Vec4::new(1.0, 0.5, 0.0, 1.0), ColorWriteMask::all());
        let back = view.read_color(2, 1, 0);
        assert_eq!(back.x, 1.0);
        assert!((back.y - 0.5).abs() < 1.0 / 255.0);
        assert_eq!(back.z, 0.0);
        assert_eq!(back.w, 1.0);
    }

    #[test]
    fn bgra_swizzles_bytes() {
        let image = ImageBuffer::new(Format::Bgra8Unorm, 1, 1, 1);
        let view = image.view();
        view.write_color(0, 0, 0, Vec4::new(1.0, 0.0, 0.0, 1.0), ColorWriteMask::all());
        let bytes = image.to_bytes();
        assert_eq!(&bytes[..4], &[0, 0, 255, 255]);
        assert_eq!(view.read_color(0, 0, 0).x, 1.0);
    }

    #[test]
    fn write_mask_preserves_unselected_channels() {
        let image = ImageBuffer::new(Format::Rgba8Unorm, 1, 1, 1);
        let view = image.view();
        view.write_color(0, 0, 0, Vec4::new(1.0, 1.0, 1.0, 1.0), ColorWriteMask::all());
        view.write_color(
            0,
            0,
            0,
            Vec4::zeros(),
            ColorWriteMask::R | ColorWriteMask::B,
        );
        let back = view.read_color(0, 0, 0);
        assert_eq!(back.x, 0.0);
        assert_eq!(back.y, 1.0);
        assert_eq!(back.z, 0.0);
        assert_eq!(back.w, 1.0);
    }

    #[test]
    fn stencil_write_mask_merges_bits() {
        let image = ImageBuffer::new(Format::Stencil8, 1, 1, 1);
        let view = image.view();
        view.write_stencil(0, 0, 0, 0xFF, 0x0F);
        assert_eq!(view.read_stencil(0, 0, 0), 0x0F);
        view.write_stencil(0, 0, 0, 0x00, 0x03);
        assert_eq!(view.read_stencil(0, 0, 0), 0x0C);
    }

    #[test]
    fn multisample_slices_are_independent() {
        let image = ImageBuffer::new(Format::Depth32Float, 2, 2, 4);
        let view = image.view();
        view.write_depth(1, 1, 0, 0.25);
        view.write_depth(1, 1, 3, 0.75);
        assert_eq!(view.read_depth(1, 1, 0), 0.25);
        assert_eq!(view.read_depth(1, 1, 3), 0.75);
        assert_eq!(view.read_depth(1, 1, 1), 0.0);
    }
}
