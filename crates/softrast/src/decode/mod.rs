//! # Compressed-Texture Block Decoders
//!
//! Pure decoders for the block-compressed formats sampled by the pixel
//! pipeline. Each block decoder maps a 64- or 128-bit block to a full 4×4
//! texel region and depends on nothing but the block bits and the format,
//! so decoded output is bit-identical across runs, platforms, and thread
//! counts.
//!
//! [`decode_image`] walks a whole mip level block by block; texels that fall
//! past the image extent are produced by the block decoder but not written,
//! so border blocks read full source data and truncate on store.
//!
//! Invalid block modes (possible in BC6H, BC7, and ASTC) decode to defined
//! fallback colours rather than failing, matching the behaviour graphics
//! drivers exhibit for malformed textures.

pub mod astc;
pub mod bc;
pub mod bc6h;
pub mod bc7;
mod partitions;

use bytemuck::{Pod, Zeroable};
use half::f16;

/// Width and height of a decoded block region.
pub const BLOCK_DIM: usize = 4;

/// An 8-bit RGBA texel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct TexelRgba8 {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl TexelRgba8 {
    /// Constructs a texel from channel values.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// A half-float RGBA texel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct TexelRgbaF16 {
    /// Red
    pub r: f16,
    /// Green
    pub g: f16,
    /// Blue
    pub b: f16,
    /// Alpha
    pub a: f16,
}

impl TexelRgbaF16 {
    /// Constructs a texel from raw half-float bit patterns.
    #[must_use]
    pub const fn from_bits(r: u16, g: u16, b: u16, a: u16) -> Self {
        Self {
            r: f16::from_bits(r),
            g: f16::from_bits(g),
            b: f16::from_bits(b),
            a: f16::from_bits(a),
        }
    }
}

/// A decoded 4×4 region of 8-bit RGBA texels.
pub type BlockRgba8 = [[TexelRgba8; BLOCK_DIM]; BLOCK_DIM];

/// A decoded 4×4 region of half-float RGBA texels.
pub type BlockRgbaF16 = [[TexelRgbaF16; BLOCK_DIM]; BLOCK_DIM];

/// The block-compressed formats this module decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    /// BC1: 64-bit colour block, RGBA8 output with 1-bit alpha.
    Bc1,
    /// BC2: 128-bit block, colour plus explicit 4-bit alpha.
    Bc2,
    /// BC3: 128-bit block, colour plus interpolated alpha.
    Bc3,
    /// BC4: 64-bit single-channel block, R8 output.
    Bc4 {
        /// Decode endpoints as signed (SNORM) values.
        signed: bool,
    },
    /// BC5: 128-bit two-channel block, R8G8 output.
    Bc5 {
        /// Decode endpoints as signed (SNORM) values.
        signed: bool,
    },
    /// BC6H: 128-bit block, RGB half-float output.
    Bc6h {
        /// Decode endpoints as signed half-float values.
        signed: bool,
    },
    /// BC7: 128-bit block, RGBA8 output.
    Bc7,
    /// ASTC: 128-bit block with a 4×4 footprint, RGBA16F output.
    Astc {
        /// Decode using the HDR profile.
        hdr: bool,
    },
}

impl BlockFormat {
    /// Bytes occupied by one compressed block.
    #[must_use]
    pub const fn block_bytes(self) -> usize {
        match self {
            Self::Bc1 | Self::Bc4 { .. } => 8,
            _ => 16,
        }
    }

    /// Bytes per decoded texel.
    #[must_use]
    pub const fn texel_bytes(self) -> usize {
        match self {
            Self::Bc4 { .. } => 1,
            Self::Bc5 { .. } => 2,
            Self::Bc1 | Self::Bc2 | Self::Bc3 | Self::Bc7 => 4,
            Self::Bc6h { .. } | Self::Astc { .. } => 8,
        }
    }
}

/// Errors surfaced when a whole image cannot be decoded.
///
/// Malformed individual blocks are not errors; they decode to the format's
/// fallback colour.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// The source buffer does not hold enough blocks for the extent.
    #[error("source holds {actual} bytes, {required} required for {width}x{height}")]
    SourceTooSmall {
        /// Bytes required for the full block grid.
        required: usize,
        /// Bytes provided.
        actual: usize,
        /// Image width in texels.
        width: usize,
        /// Image height in texels.
        height: usize,
    },
    /// The destination buffer cannot hold the decoded image.
    #[error("destination holds {actual} bytes, {required} required")]
    DestinationTooSmall {
        /// Bytes required for the decoded rows.
        required: usize,
        /// Bytes provided.
        actual: usize,
    },
}

/// Decodes a whole image of compressed blocks into `dst`.
///
/// `width` and `height` are in texels and need not be multiples of four;
/// texels a border block produces past the extent are dropped. `dst_pitch`
/// is the byte stride between destination rows.
pub fn decode_image(
    format: BlockFormat,
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    dst_pitch: usize,
) -> Result<(), DecodeError> {
    let blocks_x = width.div_ceil(BLOCK_DIM);
    let blocks_y = height.div_ceil(BLOCK_DIM);
    let src_required = blocks_x * blocks_y * format.block_bytes();
    if src.len() < src_required {
        return Err(DecodeError::SourceTooSmall {
            required: src_required,
            actual: src.len(),
            width,
            height,
        });
    }
    let dst_required = if height == 0 {
        0
    } else {
        (height - 1) * dst_pitch + width * format.texel_bytes()
    };
    if dst.len() < dst_required {
        return Err(DecodeError::DestinationTooSmall {
            required: dst_required,
            actual: dst.len(),
        });
    }

    let block_bytes = format.block_bytes();
    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let offset = (by * blocks_x + bx) * block_bytes;
            let block = &src[offset..offset + block_bytes];
            decode_block_into(format, block, dst, bx * BLOCK_DIM, by * BLOCK_DIM, width, height, dst_pitch);
        }
    }
    Ok(())
}

/// Decodes one block and stores the texels that fall inside the extent.
fn decode_block_into(
    format: BlockFormat,
    block: &[u8],
    dst: &mut [u8],
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
    dst_pitch: usize,
) {
    match format {
        BlockFormat::Bc1 => {
            let texels = bc::decode_bc1_block(block.try_into().unwrap());
            store_rgba8(&texels, dst, x0, y0, width, height, dst_pitch);
        }
        BlockFormat::Bc2 => {
            let texels = bc::decode_bc2_block(block.try_into().unwrap());
            store_rgba8(&texels, dst, x0, y0, width, height, dst_pitch);
        }
        BlockFormat::Bc3 => {
            let texels = bc::decode_bc3_block(block.try_into().unwrap());
            store_rgba8(&texels, dst, x0, y0, width, height, dst_pitch);
        }
        BlockFormat::Bc4 { signed } => {
            let red = bc::decode_channel_block(block.try_into().unwrap(), signed);
            store_channels(&[&red], dst, x0, y0, width, height, dst_pitch);
        }
        BlockFormat::Bc5 { signed } => {
            let red = bc::decode_channel_block(block[..8].try_into().unwrap(), signed);
            let green = bc::decode_channel_block(block[8..].try_into().unwrap(), signed);
            store_channels(&[&red, &green], dst, x0, y0, width, height, dst_pitch);
        }
        BlockFormat::Bc6h { signed } => {
            let texels = bc6h::decode_block(block.try_into().unwrap(), signed);
            store_rgba_f16(&texels, dst, x0, y0, width, height, dst_pitch);
        }
        BlockFormat::Bc7 => {
            let texels = bc7::decode_block(block.try_into().unwrap());
            store_rgba8(&texels, dst, x0, y0, width, height, dst_pitch);
        }
        BlockFormat::Astc { hdr } => {
            let texels = astc::decode_block(block.try_into().unwrap(), hdr);
            store_rgba_f16(&texels, dst, x0, y0, width, height, dst_pitch);
        }
    }
}

fn store_rgba8(
    texels: &BlockRgba8,
    dst: &mut [u8],
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
    dst_pitch: usize,
) {
    for (j, row) in texels.iter().enumerate() {
        if y0 + j >= height {
            break;
        }
        for (i, texel) in row.iter().enumerate() {
            if x0 + i >= width {
                break;
            }
            let offset = (y0 + j) * dst_pitch + (x0 + i) * 4;
            dst[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(texel));
        }
    }
}

fn store_rgba_f16(
    texels: &BlockRgbaF16,
    dst: &mut [u8],
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
    dst_pitch: usize,
) {
    for (j, row) in texels.iter().enumerate() {
        if y0 + j >= height {
            break;
        }
        for (i, texel) in row.iter().enumerate() {
            if x0 + i >= width {
                break;
            }
            let offset = (y0 + j) * dst_pitch + (x0 + i) * 8;
            dst[offset..offset + 8].copy_from_slice(bytemuck::bytes_of(texel));
        }
    }
}

/// Interleaves per-channel 4×4 planes into the destination.
fn store_channels(
    channels: &[&[u8; 16]],
    dst: &mut [u8],
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
    dst_pitch: usize,
) {
    let texel_bytes = channels.len();
    for j in 0..BLOCK_DIM {
        if y0 + j >= height {
            break;
        }
        for i in 0..BLOCK_DIM {
            if x0 + i >= width {
                break;
            }
            let offset = (y0 + j) * dst_pitch + (x0 + i) * texel_bytes;
            for (c, plane) in channels.iter().enumerate() {
                dst[offset + c] = plane[j * BLOCK_DIM + i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_source() {
        let src = [0u8; 8];
        let mut dst = [0u8; 16 * 16 * 4];
        let err = decode_image(BlockFormat::Bc1, &src, &mut dst, 16, 16, 64);
        assert!(matches!(err, Err(DecodeError::SourceTooSmall { .. })));
    }

    #[test]
    fn rejects_short_destination() {
        let src = [0u8; 8];
        let mut dst = [0u8; 15];
        let err = decode_image(BlockFormat::Bc1, &src, &mut dst, 4, 4, 16);
        assert!(matches!(err, Err(DecodeError::DestinationTooSmall { .. })));
    }

    #[test]
    fn truncates_writes_at_the_image_border() {
        // A 3x3 image still reads one full block but writes only 3x3 texels.
        let src = [0x00, 0xF8, 0x00, 0xF8, 0, 0, 0, 0];
        let mut dst = vec![0xEEu8; 3 * 16];
        decode_image(BlockFormat::Bc1, &src, &mut dst, 3, 3, 16).unwrap();
        for row in 0..3 {
            // Written texels are solid red.
            assert_eq!(&dst[row * 16..row * 16 + 4], &[255, 0, 0, 255]);
            assert_eq!(&dst[row * 16 + 8..row * 16 + 12], &[255, 0, 0, 255]);
            // The fourth column is outside the extent and stays untouched.
            assert_eq!(&dst[row * 16 + 12..row * 16 + 16], &[0xEE; 4]);
        }
    }
}
