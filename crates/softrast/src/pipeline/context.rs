//! The recorded-draw snapshot
//!
//! A [`DrawContext`] carries everything a draw binds: streams, index buffer,
//! attachments, fixed-function state, and the stage routines. `Renderer::draw`
//! promotes it into a pooled `DrawCall`; the context itself stays owned by the
//! caller and can be reused across draws.

use std::sync::Arc;

use crate::pipeline::routine::{PixelRoutineHandle, SetupRoutineHandle, VertexRoutineHandle};
use crate::pipeline::state::{
    BlendState, CullMode, DepthState, FrontFace, InterpolationMode, ProvokingVertex, StencilState,
    Topology, MAX_COLOR_TARGETS,
};
use crate::pipeline::MAX_ATTRIBUTES;
use crate::raster::AttachmentView;

/// Size of the push-constant block, matching the Vulkan minimum.
pub const PUSH_CONSTANT_BYTES: usize = 128;

/// An opaque descriptor-set binding snapshot.
///
/// The core never inspects descriptor contents; routines downcast to
/// whatever representation the outer layer bound.
pub type DescriptorSnapshot = Arc<dyn std::any::Any + Send + Sync>;

/// One bound vertex buffer.
#[derive(Clone, Default)]
pub struct VertexStream {
    /// Backing bytes; shared with the binding layer.
    pub data: Arc<Vec<u8>>,
    /// Byte offset of the first vertex.
    pub offset: usize,
    /// Byte stride between vertices.
    pub stride: usize,
    /// Byte stride between instances; zero for per-vertex data.
    pub instance_stride: usize,
}

impl VertexStream {
    /// Advances the stream past `instances` instances.
    ///
    /// Used between draws of a multi-instance sequence so per-instance
    /// attributes pick up where the previous draw stopped.
    pub fn advance_instances(&mut self, instances: u32) {
        self.offset += self.instance_stride * instances as usize;
    }
}

/// Everything one recorded draw binds.
#[derive(Clone)]
pub struct DrawContext {
    /// Primitive topology.
    pub topology: Topology,
    /// Provoking-vertex convention for flat attributes.
    pub provoking_vertex: ProvokingVertex,
    /// Facing cull mode.
    pub cull_mode: CullMode,
    /// Winding that counts as front-facing.
    pub front_face: FrontFace,
    /// Bound vertex streams.
    pub streams: Vec<VertexStream>,
    /// Bound index buffer, if the draw is indexed.
    pub index_buffer: Option<Arc<Vec<u8>>>,
    /// Byte offset into the index buffer.
    pub index_offset: usize,
    /// Number of live vertex-output attributes.
    pub attribute_count: usize,
    /// Interpolation discipline per attribute.
    pub interpolation: [InterpolationMode; MAX_ATTRIBUTES],
    /// Vertex-stage routine; a draw without one produces no primitives.
    pub vertex_routine: Option<VertexRoutineHandle>,
    /// Setup routine; `None` selects the standard fixed-function setup.
    pub setup_routine: Option<SetupRoutineHandle>,
    /// Pixel-stage routine; a draw without one produces no writes.
    pub pixel_routine: Option<PixelRoutineHandle>,
    /// Bound colour targets.
    pub color_targets: Vec<AttachmentView>,
    /// Bound depth target.
    pub depth_target: Option<AttachmentView>,
    /// Bound stencil target.
    pub stencil_target: Option<AttachmentView>,
    /// Depth-test state.
    pub depth: DepthState,
    /// Stencil state.
    pub stencil: StencilState,
    /// Per-target blend state.
    pub blend: [BlendState; MAX_COLOR_TARGETS],
    /// Blend constant colour.
    pub blend_constants: [f32; 4],
    /// Descriptor-set snapshot handed through to routines.
    pub descriptors: Option<DescriptorSnapshot>,
    /// Push-constant storage.
    pub push_constants: [u8; PUSH_CONSTANT_BYTES],
    /// Instance id of this draw.
    pub instance_id: u32,
    /// Rasterization sample count: 1 or 4.
    pub sample_count: u32,
}

impl Default for DrawContext {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            provoking_vertex: ProvokingVertex::default(),
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            streams: Vec::new(),
            index_buffer: None,
            index_offset: 0,
            attribute_count: 0,
            interpolation: [InterpolationMode::default(); MAX_ATTRIBUTES],
            vertex_routine: None,
            setup_routine: None,
            pixel_routine: None,
            color_targets: Vec::new(),
            depth_target: None,
            stencil_target: None,
            depth: DepthState::default(),
            stencil: StencilState::default(),
            blend: [BlendState::default(); MAX_COLOR_TARGETS],
            blend_constants: [0.0; 4],
            descriptors: None,
            push_constants: [0; PUSH_CONSTANT_BYTES],
            instance_id: 0,
            sample_count: 1,
        }
    }
}

impl DrawContext {
    /// A context with single-sampled defaults and no routines.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
