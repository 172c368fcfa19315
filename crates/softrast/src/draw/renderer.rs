//! The renderer: draw submission and retirement
//!
//! Owns the DrawCall and BatchData pools, the ticket queue ordering draws,
//! and the mutable render state (viewport, scissor, attached queries).
//! Submission promotes the bound [`DrawContext`] into a pooled `DrawCall`
//! and fans the work out over the injected scheduler; `synchronize` blocks
//! until everything submitted so far has retired.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::draw::draw_call::{launch_batch, BatchData, DrawCall};
use crate::draw::query::Query;
use crate::draw::{TaskEvents, BATCH_SIZE, MAX_BATCHES, MAX_DRAW_CALLS};
use crate::pipeline::context::DrawContext;
use crate::pipeline::routine::StandardSetup;
use crate::pipeline::state::{IndexType, Topology};
use crate::pipeline::VertexStream;
use crate::raster::setup::PrimitiveClass;
use crate::raster::{Scissor, SetupParams, Viewport};
use crate::task::{FixedPool, Scheduler, TicketQueue, WaitGroup};

struct RenderState {
    viewport: Viewport,
    scissor: Scissor,
    queries: Vec<Arc<Query>>,
}

/// Executes recorded draws on a worker pool.
pub struct Renderer {
    scheduler: Arc<Scheduler>,
    draw_pool: FixedPool<DrawCall>,
    batch_pool: FixedPool<BatchData>,
    tickets: TicketQueue,
    next_draw_id: AtomicU64,
    in_flight: WaitGroup,
    state: Mutex<RenderState>,
}

impl Renderer {
    /// Creates a renderer executing on `scheduler`.
    ///
    /// The scheduler is injected so tests can run the whole pipeline on a
    /// deterministic single-threaded instance.
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            draw_pool: FixedPool::with_capacity(MAX_DRAW_CALLS),
            batch_pool: FixedPool::with_capacity(MAX_BATCHES),
            tickets: TicketQueue::new(Arc::clone(&scheduler)),
            next_draw_id: AtomicU64::new(0),
            in_flight: WaitGroup::new(0),
            state: Mutex::new(RenderState {
                viewport: Viewport::default(),
                scissor: Scissor::default(),
                queries: Vec::new(),
            }),
            scheduler,
        }
    }

    /// The scheduler draws execute on.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Sets the viewport used by draws submitted from now on.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.lock_state().viewport = viewport;
    }

    /// Sets the scissor used by draws submitted from now on.
    pub fn set_scissor(&self, scissor: Scissor) {
        self.lock_state().scissor = scissor;
    }

    /// Attaches a query; draws submitted while attached resolve into it.
    pub fn add_query(&self, query: Arc<Query>) {
        self.lock_state().queries.push(query);
    }

    /// Detaches a previously attached query.
    pub fn remove_query(&self, query: &Arc<Query>) {
        self.lock_state()
            .queries
            .retain(|q| !Arc::ptr_eq(q, query));
    }

    /// Advances per-instance stream offsets between draws of a sequence.
    pub fn advance_instance_attributes(&self, streams: &mut [VertexStream]) {
        for stream in streams {
            stream.advance_instances(1);
        }
    }

    /// Blocks until every draw submitted so far has retired.
    pub fn synchronize(&self) {
        self.in_flight.wait();
    }

    /// Submits a draw.
    ///
    /// `events.start()` is observed before any stage runs and
    /// `events.finish()` after all stages complete; a draw that produces no
    /// primitives still observes both.
    pub fn draw(
        &self,
        context: &DrawContext,
        index_type: IndexType,
        count: u32,
        base_vertex: i32,
        events: Arc<dyn TaskEvents>,
    ) {
        events.start();
        let num_primitives = context.topology.primitive_count(count);
        if num_primitives == 0 {
            events.finish();
            return;
        }

        let id = self.next_draw_id.fetch_add(1, Ordering::Relaxed);
        let num_batches = num_primitives.div_ceil(BATCH_SIZE as u32);
        let (target_width, target_height) = target_extent(context);

        let mut draw_loan = self.draw_pool.borrow();
        let mut batches = Vec::new();
        {
            let draw = draw_loan
                .get_mut()
                .expect("a freshly borrowed draw call has no other holders");
            draw.begin(id);
            draw.topology = context.topology;
            draw.index_type = index_type;
            draw.provoking_vertex = context.provoking_vertex;
            draw.base_vertex = base_vertex;
            draw.instance_id = context.instance_id;
            draw.streams = context.streams.clone();
            draw.index_buffer = context.index_buffer.clone();
            draw.index_offset = context.index_offset;
            draw.vertex_routine = context.vertex_routine.clone();
            draw.setup_routine = Some(
                context
                    .setup_routine
                    .clone()
                    .unwrap_or_else(|| Arc::new(StandardSetup)),
            );
            draw.pixel_routine = context.pixel_routine.clone();
            draw.data.color_targets = context.color_targets.clone();
            draw.data.depth_target = context.depth_target.clone();
            draw.data.stencil_target = context.stencil_target.clone();
            draw.data.depth_state = context.depth;
            draw.data.stencil_state = context.stencil;
            draw.data.blend = context.blend;
            draw.data.blend_constants = context.blend_constants;
            draw.data.push_constants = context.push_constants;
            draw.data.sample_count = context.sample_count.max(1);
            draw.num_primitives = num_primitives;
            draw.num_batches = num_batches;
            draw.events = Some(events);
            draw.in_flight = Some(self.in_flight.clone());

            // Queries, the state snapshot, and the ticket chain are taken
            // under one lock so concurrent submissions keep queue order.
            let state = self.lock_state();
            draw.queries = state.queries.clone();
            draw.data.setup = SetupParams {
                class: primitive_class(context.topology),
                viewport: state.viewport,
                scissor: state.scissor,
                target_width,
                target_height,
                cull_mode: context.cull_mode,
                front_face: context.front_face,
                interpolation: context.interpolation,
                attribute_count: context.attribute_count,
                line_width: 1.0,
                point_size: 1.0,
            };
            let tickets = &mut draw.batch_tickets;
            self.tickets
                .take_n(num_batches as usize, |ticket| tickets.push(ticket));

            // Acquire batch slots while still holding the state lock: slot
            // acquisition must follow ticket order, or a later draw could
            // hoard every slot while an earlier one starves. At least one
            // slot is taken blocking (the submission back-pressure point);
            // extras are opportunistic.
            let slots = (num_batches as usize).min(MAX_BATCHES);
            batches.push(self.batch_pool.borrow());
            while batches.len() < slots {
                match self.batch_pool.try_borrow() {
                    Some(batch) => batches.push(batch),
                    None => break,
                }
            }
        }
        self.in_flight.add(1);
        log::trace!("draw {id}: {num_primitives} primitives in {num_batches} batches");

        for batch in batches {
            launch_batch(&self.scheduler, draw_loan.clone(), batch);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RenderState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

const fn primitive_class(topology: Topology) -> PrimitiveClass {
    match topology {
        Topology::PointList => PrimitiveClass::Point,
        Topology::LineList | Topology::LineStrip => PrimitiveClass::Line,
        Topology::TriangleList | Topology::TriangleStrip | Topology::TriangleFan => {
            PrimitiveClass::Triangle
        }
    }
}

fn target_extent(context: &DrawContext) -> (u32, u32) {
    context
        .color_targets
        .first()
        .map(|v| (v.width(), v.height()))
        .or_else(|| {
            context
                .depth_target
                .as_ref()
                .map(|v| (v.width(), v.height()))
        })
        .or_else(|| {
            context
                .stencil_target
                .as_ref()
                .map(|v| (v.width(), v.height()))
        })
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::NopTaskEvents;
    use std::sync::atomic::AtomicUsize;

    struct CountingEvents {
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl CountingEvents {
        fn new() -> Self {
            Self {
                started: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            }
        }
    }

    impl TaskEvents for CountingEvents {
        fn start(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn finish(&self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn empty_draws_still_observe_events() {
        let renderer = Renderer::new(Arc::new(Scheduler::single_threaded()));
        let events = Arc::new(CountingEvents::new());
        let context = DrawContext::default();
        renderer.draw(&context, IndexType::Sequential, 2, 0, events.clone());
        renderer.synchronize();
        assert_eq!(events.started.load(Ordering::SeqCst), 1);
        assert_eq!(events.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn draws_without_routines_retire() {
        let renderer = Renderer::new(Arc::new(Scheduler::single_threaded()));
        let context = DrawContext::default();
        // Three vertices make one primitive; no routines are bound, so it
        // flows through the pipeline and produces nothing.
        renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
        renderer.synchronize();
    }

    #[test]
    fn queries_attach_to_draws_created_while_active() {
        let renderer = Renderer::new(Arc::new(Scheduler::single_threaded()));
        let query = Arc::new(Query::new(crate::draw::QueryType::Occlusion));
        renderer.add_query(Arc::clone(&query));
        let context = DrawContext::default();
        renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
        renderer.synchronize();
        assert!(query.is_finished());
        assert_eq!(query.value(), 0);

        query.reset();
        renderer.remove_query(&query);
        renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
        renderer.synchronize();
        assert!(!query.is_finished());
    }

    #[test]
    fn draw_ids_strictly_increase() {
        let renderer = Renderer::new(Arc::new(Scheduler::single_threaded()));
        let a = renderer.next_draw_id.load(Ordering::Relaxed);
        let context = DrawContext::default();
        renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
        renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
        renderer.synchronize();
        assert_eq!(renderer.next_draw_id.load(Ordering::Relaxed), a + 2);
    }
}
