//! # Pipeline State and Stage Routines
//!
//! The seam between the draw core and the code it executes:
//!
//! - **State types**: topology, culling, depth-stencil, and blend state with
//!   Vulkan semantics, snapshotted per draw
//! - **Routines**: trait objects standing in for JIT-compiled stage code;
//!   the scheduler only ever sees the traits
//! - **DrawContext**: everything a recorded draw binds, promoted into a
//!   `DrawCall` at submission

pub mod context;
pub mod reference;
pub mod routine;
pub mod state;

pub use context::{DrawContext, VertexStream};
pub use routine::{
    PixelRoutine, QuadArgs, SetupRoutine, TransformedVertex, VertexArgs, VertexRoutine,
    MAX_ATTRIBUTES,
};
pub use state::{
    BlendFactor, BlendOp, BlendState, ColorWriteMask, CompareOp, CullMode, DepthState, FrontFace,
    IndexType, InterpolationMode, ProvokingVertex, StencilOp, StencilOpState, StencilState,
    Topology, MAX_COLOR_TARGETS,
};
