//! Reference software routines
//!
//! Plain-Rust stage implementations behind the routine traits, standing in
//! for JIT-compiled code in tests and demos. The vertex routine reads an
//! interleaved position/colour stream; the pixel routines emit either a
//! solid colour or the first interpolated attribute.

use crate::foundation::math::Vec4;
use crate::pipeline::routine::{
    PixelRoutine, QuadArgs, TransformedVertex, VertexArgs, VertexRoutine,
};

/// Bytes per vertex for [`InterleavedVertex`]: a vec4 position followed by
/// a vec4 colour.
pub const INTERLEAVED_STRIDE: usize = 32;

/// Packs position/colour pairs into the byte layout [`InterleavedVertex`]
/// reads.
#[must_use]
pub fn pack_vertices(vertices: &[(Vec4, Vec4)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vertices.len() * INTERLEAVED_STRIDE);
    for (position, color) in vertices {
        for c in 0..4 {
            out.extend_from_slice(&position[c].to_le_bytes());
        }
        for c in 0..4 {
            out.extend_from_slice(&color[c].to_le_bytes());
        }
    }
    out
}

/// Vertex stage reading clip-space position and colour from stream zero.
pub struct InterleavedVertex;

impl VertexRoutine for InterleavedVertex {
    fn execute(&self, args: &mut VertexArgs<'_>) {
        let stream = &args.streams[0];
        for (slot, &index) in args.indices.iter().enumerate() {
            let vertex = i64::from(index) + i64::from(args.base_vertex);
            let at = stream.offset + vertex.max(0) as usize * stream.stride;
            let bytes = &stream.data[at..at + INTERLEAVED_STRIDE];
            let read = |i: usize| {
                f32::from_le_bytes([
                    bytes[i * 4],
                    bytes[i * 4 + 1],
                    bytes[i * 4 + 2],
                    bytes[i * 4 + 3],
                ])
            };
            let mut out = TransformedVertex {
                position: Vec4::new(read(0), read(1), read(2), read(3)),
                ..TransformedVertex::default()
            };
            out.attributes[0] = Vec4::new(read(4), read(5), read(6), read(7));
            args.outputs[slot] = out;
        }
    }
}

/// Pixel stage writing one solid colour to target zero.
pub struct SolidPixel {
    /// The colour every covered sample receives.
    pub color: Vec4,
}

impl PixelRoutine for SolidPixel {
    fn execute(&self, quad: &mut QuadArgs<'_>) {
        for lane in 0..4 {
            quad.color[0][lane] = self.color;
        }
    }
}

/// Pixel stage writing the first interpolated attribute to target zero.
pub struct AttributePixel;

impl PixelRoutine for AttributePixel {
    fn execute(&self, quad: &mut QuadArgs<'_>) {
        for lane in 0..4 {
            quad.color[0][lane] = quad.attributes[0][lane];
        }
    }
}

/// Pixel stage that kills samples whose first attribute alpha falls below a
/// threshold.
pub struct AlphaTestPixel {
    /// Minimum alpha a sample needs to survive.
    pub threshold: f32,
}

impl PixelRoutine for AlphaTestPixel {
    fn may_discard(&self) -> bool {
        true
    }

    fn execute(&self, quad: &mut QuadArgs<'_>) {
        for lane in 0..4 {
            let color = quad.attributes[0][lane];
            if color.w < self.threshold {
                quad.coverage[lane] = 0;
            }
            quad.color[0][lane] = color;
        }
    }
}
