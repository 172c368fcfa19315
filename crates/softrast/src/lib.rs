//! # softrast
//!
//! A CPU execution core for Vulkan draw calls. Recorded draws are split into
//! vertex, primitive-assembly, and per-cluster pixel work, executed across a
//! work-stealing worker pool, and retired in submission order per attachment.
//!
//! ## Features
//!
//! - **Batch Pipeline**: Draws fan out into fixed-size batches processed as
//!   chained tasks (vertex → primitive → pixel)
//! - **Software Rasterizer**: Half-space rasterization with perspective-correct
//!   interpolation, depth-stencil, and blending per Vulkan semantics
//! - **Compressed Textures**: Bit-exact BC1–BC7, BC6H, and ASTC block decoding
//! - **Ticket Queue**: Dependency-ordered asynchronous work with FIFO
//!   guarantees per resource
//! - **Deterministic Tests**: A single-threaded scheduler mode for
//!   reproducible pipeline output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use softrast::task::Scheduler;
//! use softrast::draw::{Renderer, NopTaskEvents};
//! use softrast::pipeline::{DrawContext, IndexType};
//!
//! let scheduler = Arc::new(Scheduler::single_threaded());
//! let renderer = Renderer::new(scheduler);
//!
//! let context = DrawContext::default();
//! renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
//! renderer.synchronize();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

pub mod config;
pub mod decode;
pub mod draw;
pub mod foundation;
pub mod pipeline;
pub mod raster;
pub mod task;
pub mod wsi;

/// Common imports for library users
pub mod prelude {
    pub use crate::{
        config::{AffinityPolicy, ProcessorConfig},
        draw::{NopTaskEvents, Renderer, TaskEvents},
        pipeline::{
            BlendState, DepthState, DrawContext, IndexType, StencilState, Topology, VertexStream,
        },
        raster::{AttachmentView, Format, Scissor, Viewport},
        task::{Scheduler, Ticket, TicketQueue},
        wsi::{HeadlessPresenter, Presenter},
    };
}
