//! Stage routine traits
//!
//! JIT-compiled pipeline stages are opaque to the draw core: it only ever
//! calls through these traits with stage argument blocks. Software
//! implementations (used by tests and demos) sit behind the same traits, so
//! the scheduler and rasterizer never distinguish the two.

use std::sync::Arc;

use crate::foundation::math::Vec4;
use crate::pipeline::context::VertexStream;
use crate::raster::{Primitive, SetupParams, Triangle};

/// Maximum number of interpolated vertex outputs besides position.
pub const MAX_ATTRIBUTES: usize = 8;

/// A vertex after the vertex stage: clip-space position plus attributes.
#[derive(Debug, Clone, Copy)]
pub struct TransformedVertex {
    /// Clip-space position.
    pub position: Vec4,
    /// Vertex outputs consumed by the pixel stage.
    pub attributes: [Vec4; MAX_ATTRIBUTES],
}

impl Default for TransformedVertex {
    fn default() -> Self {
        Self {
            position: Vec4::new(0.0, 0.0, 0.0, 1.0),
            attributes: [Vec4::zeros(); MAX_ATTRIBUTES],
        }
    }
}

/// Argument block for one vertex-stage invocation.
pub struct VertexArgs<'a> {
    /// Bound vertex streams, offsets already adjusted per instance.
    pub streams: &'a [VertexStream],
    /// Vertex indices to fetch, already resolved from the index buffer.
    pub indices: &'a [u32],
    /// Base vertex added to every index.
    pub base_vertex: i32,
    /// Instance being drawn.
    pub instance_id: u32,
    /// Push-constant bytes.
    pub push_constants: &'a [u8],
    /// Output slots, one per index.
    pub outputs: &'a mut [TransformedVertex],
}

/// The vertex stage: fetches inputs and writes transformed vertices.
pub trait VertexRoutine: Send + Sync {
    /// Transforms `args.indices.len()` vertices into `args.outputs`.
    fn execute(&self, args: &mut VertexArgs<'_>);
}

pub use crate::raster::setup::StandardSetup;

/// The primitive-setup stage: edge equations, interpolant planes, culling.
///
/// Returns the number of visible primitives written. The standard
/// fixed-function implementation is [`StandardSetup`]; a JIT back-end can
/// substitute its own specialized code.
pub trait SetupRoutine: Send + Sync {
    /// Processes `triangles`, appending visible primitives to `primitives`.
    fn setup(
        &self,
        triangles: &[Triangle],
        primitives: &mut Vec<Primitive>,
        params: &SetupParams,
    ) -> usize;
}

/// Argument block for one pixel-stage invocation, covering a 2×2 quad.
///
/// Lane order is (x, y), (x+1, y), (x, y+1), (x+1, y+1). The routine reads
/// interpolated attributes and writes per-target colours; it may narrow
/// `coverage` to discard samples, but must never widen it.
pub struct QuadArgs<'a> {
    /// Framebuffer x of the quad's top-left pixel.
    pub x: i32,
    /// Framebuffer y of the quad's top-left pixel.
    pub y: i32,
    /// Interpolated attributes: `[attribute][lane]`.
    pub attributes: &'a [[Vec4; 4]],
    /// Attribute x-gradients, one per attribute.
    pub ddx: &'a [Vec4],
    /// Attribute y-gradients, one per attribute.
    pub ddy: &'a [Vec4],
    /// Interpolated 1/w per lane.
    pub one_over_w: [f32; 4],
    /// Interpolated depth per lane; writable when the routine exports depth.
    pub depth: &'a mut [f32; 4],
    /// Per-lane sample coverage masks. In/out.
    pub coverage: &'a mut [u32; 4],
    /// Output colour per bound target per lane; index 1 doubles as the
    /// dual-source colour when blending uses it.
    pub color: &'a mut [[Vec4; 4]],
    /// Push-constant bytes.
    pub push_constants: &'a [u8],
}

/// The pixel stage: shades covered quads.
pub trait PixelRoutine: Send + Sync {
    /// Whether the routine writes `depth`; forces the late depth test.
    fn writes_depth(&self) -> bool {
        false
    }

    /// Whether the routine may narrow coverage; forces the late depth test.
    fn may_discard(&self) -> bool {
        false
    }

    /// Shades one covered quad.
    fn execute(&self, quad: &mut QuadArgs<'_>);
}

/// Shared handle to a vertex routine.
pub type VertexRoutineHandle = Arc<dyn VertexRoutine>;
/// Shared handle to a setup routine.
pub type SetupRoutineHandle = Arc<dyn SetupRoutine>;
/// Shared handle to a pixel routine.
pub type PixelRoutineHandle = Arc<dyn PixelRoutine>;
