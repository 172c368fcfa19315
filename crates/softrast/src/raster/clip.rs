//! Homogeneous frustum clipping
//!
//! Primitives are clipped in clip space against the Vulkan view volume
//! (`-w <= x <= w`, `-w <= y <= w`, `0 <= z <= w`). Clipping a triangle
//! yields a convex polygon of at most nine vertices which setup fans back
//! into triangles.

use crate::pipeline::routine::{TransformedVertex, MAX_ATTRIBUTES};

/// Maximum vertices a triangle can clip into (three plus one per plane).
pub const MAX_CLIPPED: usize = 9;

/// A clipped polygon.
pub struct ClippedPolygon {
    /// Vertex storage; only the first `len` entries are valid.
    pub vertices: [TransformedVertex; MAX_CLIPPED],
    /// Number of valid vertices; zero when fully outside.
    pub len: usize,
}

/// The six frustum planes as signed distance functions.
const PLANES: [fn(&TransformedVertex) -> f32; 6] = [
    |v| v.position.w + v.position.x, // x >= -w
    |v| v.position.w - v.position.x, // x <= w
    |v| v.position.w + v.position.y, // y >= -w
    |v| v.position.w - v.position.y, // y <= w
    |v| v.position.z,                // z >= 0
    |v| v.position.w - v.position.z, // z <= w
];

/// Bitmask of planes vertex `v` is outside of.
#[must_use]
pub fn outcode(v: &TransformedVertex) -> u8 {
    let mut code = 0;
    for (i, plane) in PLANES.iter().enumerate() {
        if plane(v) < 0.0 {
            code |= 1 << i;
        }
    }
    code
}

fn lerp_vertex(a: &TransformedVertex, b: &TransformedVertex, t: f32) -> TransformedVertex {
    let mut out = TransformedVertex {
        position: a.position + (b.position - a.position) * t,
        attributes: a.attributes,
    };
    for i in 0..MAX_ATTRIBUTES {
        out.attributes[i] = a.attributes[i] + (b.attributes[i] - a.attributes[i]) * t;
    }
    out
}

/// Clips a triangle against all six frustum planes.
///
/// Attributes are interpolated linearly in clip space, which is exact for
/// everything that is later interpolated with perspective correction.
#[must_use]
pub fn clip_triangle(vertices: &[TransformedVertex; 3]) -> ClippedPolygon {
    let mut current = [TransformedVertex::default(); MAX_CLIPPED];
    let mut next = [TransformedVertex::default(); MAX_CLIPPED];
    current[..3].copy_from_slice(vertices);
    let mut len = 3;

    for plane in PLANES {
        if len == 0 {
            break;
        }
        let mut out_len = 0;
        for i in 0..len {
            let a = &current[i];
            let b = &current[(i + 1) % len];
            let da = plane(a);
            let db = plane(b);
            if da >= 0.0 {
                next[out_len] = *a;
                out_len += 1;
            }
            // Edge crosses the plane: emit the intersection.
            if (da >= 0.0) != (db >= 0.0) {
                let t = da / (da - db);
                next[out_len] = lerp_vertex(a, b, t);
                out_len += 1;
            }
        }
        current[..out_len].copy_from_slice(&next[..out_len]);
        len = out_len;
    }

    ClippedPolygon {
        vertices: current,
        len,
    }
}

/// Clips a line segment parametrically against the frustum planes.
///
/// Returns the clipped endpoints, or `None` when the segment is fully
/// outside.
#[must_use]
pub fn clip_segment(
    a: &TransformedVertex,
    b: &TransformedVertex,
) -> Option<(TransformedVertex, TransformedVertex)> {
    let mut t0 = 0.0_f32;
    let mut t1 = 1.0_f32;
    for plane in PLANES {
        let da = plane(a);
        let db = plane(b);
        if da < 0.0 && db < 0.0 {
            return None;
        }
        if da < 0.0 {
            t0 = t0.max(da / (da - db));
        } else if db < 0.0 {
            t1 = t1.min(da / (da - db));
        }
    }
    if t0 > t1 {
        return None;
    }
    Some((lerp_vertex(a, b, t0), lerp_vertex(a, b, t1)))
}
