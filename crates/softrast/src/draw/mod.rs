//! # Draw Scheduler and Batch Pipeline
//!
//! Turns a recorded draw into a wave of ordered tasks:
//!
//! 1. `Renderer::draw` snapshots the bound state into a pooled `DrawCall`,
//!    partitions the primitives into fixed-size batches, and takes one
//!    ticket per batch from the renderer's queue
//! 2. each batch runs a vertex task, which chains a primitive-assembly
//!    task, which registers per-cluster pixel tasks on the batch's ticket
//! 3. pixel tasks run when the ticket is called, keeping attachment writes
//!    in submission order; the last one marks the ticket done and recycles
//!    the batch slot for the draw's next primitive range
//!
//! A draw retires when all of its batches have: queries are resolved, the
//! events sink observes `finish()`, and the pooled structures return.

pub mod assembly;
pub(crate) mod draw_call;
pub mod query;
pub mod renderer;

#[cfg(test)]
mod pipeline_tests;

pub use query::{Query, QueryType};
pub use renderer::Renderer;

/// Maximum primitives processed per batch.
pub const BATCH_SIZE: usize = 128;

/// DrawCall pool capacity: draws in flight per renderer.
pub const MAX_DRAW_CALLS: usize = 16;

/// BatchData pool capacity: batches in flight per renderer.
pub const MAX_BATCHES: usize = 8;

/// Observer for a draw's execution lifetime.
///
/// `start` is observed before any stage of the draw runs; `finish` after
/// every stage has completed.
pub trait TaskEvents: Send + Sync {
    /// The draw has been accepted and is about to be scheduled.
    fn start(&self);
    /// Every stage of the draw has completed.
    fn finish(&self);
}

/// A `TaskEvents` sink that ignores both events.
pub struct NopTaskEvents;

impl TaskEvents for NopTaskEvents {
    fn start(&self) {}
    fn finish(&self) {}
}
