//! Primitive assembly
//!
//! Expands a primitive range into per-corner vertex indices according to
//! topology and index type, and selects the provoking-vertex slot for flat
//! attributes. Strips and fans become independent primitives here; odd
//! strip primitives swap their first two corners to keep a consistent
//! winding.

use crate::pipeline::state::{IndexType, ProvokingVertex, Topology};

/// Corner slots per assembled primitive; lines and points duplicate unused
/// corners.
pub const CORNERS: usize = 3;

/// Reads one index from an index buffer.
#[must_use]
pub fn fetch_index(data: &[u8], index_type: IndexType, offset: usize, element: u32) -> u32 {
    let element = element as usize;
    match index_type {
        IndexType::Sequential => element as u32,
        IndexType::U8 => u32::from(data[offset + element]),
        IndexType::U16 => {
            let at = offset + element * 2;
            u32::from(u16::from_le_bytes([data[at], data[at + 1]]))
        }
        IndexType::U32 => {
            let at = offset + element * 4;
            u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        }
    }
}

/// The corner elements and provoking corner of one primitive.
///
/// Elements index into the draw's vertex sequence (before the index buffer
/// is applied).
#[must_use]
pub fn primitive_elements(
    topology: Topology,
    primitive: u32,
    provoking: ProvokingVertex,
) -> ([u32; CORNERS], usize) {
    let p = primitive;
    match topology {
        Topology::TriangleList => {
            let first = if provoking == ProvokingVertex::Last { 2 } else { 0 };
            ([3 * p, 3 * p + 1, 3 * p + 2], first)
        }
        Topology::TriangleStrip => {
            // Odd primitives swap their leading corners to preserve winding.
            if p % 2 == 1 {
                let slot = if provoking == ProvokingVertex::Last { 2 } else { 1 };
                ([p + 1, p, p + 2], slot)
            } else {
                let slot = if provoking == ProvokingVertex::Last { 2 } else { 0 };
                ([p, p + 1, p + 2], slot)
            }
        }
        Topology::TriangleFan => {
            let slot = if provoking == ProvokingVertex::Last { 2 } else { 1 };
            ([0, p + 1, p + 2], slot)
        }
        Topology::LineList => {
            let slot = if provoking == ProvokingVertex::Last { 1 } else { 0 };
            ([2 * p, 2 * p + 1, 2 * p + 1], slot)
        }
        Topology::LineStrip => {
            let slot = if provoking == ProvokingVertex::Last { 1 } else { 0 };
            ([p, p + 1, p + 1], slot)
        }
        Topology::PointList => ([p, p, p], 0),
    }
}

/// Builds the per-corner element list for a batch of primitives.
///
/// `out` receives `CORNERS` entries per primitive; `provoking_out` one slot
/// index per primitive.
pub fn batch_elements(
    topology: Topology,
    provoking: ProvokingVertex,
    first_primitive: u32,
    count: u32,
    out: &mut Vec<u32>,
    provoking_out: &mut Vec<usize>,
) {
    out.clear();
    provoking_out.clear();
    for i in 0..count {
        let (corners, slot) = primitive_elements(topology, first_primitive + i, provoking);
        out.extend_from_slice(&corners);
        provoking_out.push(slot);
    }
}
