//! DrawCall and BatchData: the pooled units of draw execution
//!
//! A `DrawCall` is the immutable snapshot of one submitted draw plus its
//! progress counters; batches reference it through shared loans. A
//! `BatchData` is a reusable slice of work: its mutable body passes from
//! stage to stage under a lock that is only ever contended for an instant,
//! while per-cluster pixel tasks read it concurrently.
//!
//! Stages chain by enqueuing their successor: vertex tasks enqueue
//! primitive assembly, which registers the pixel stage as a continuation of
//! the batch's ticket. The last pixel task marks the ticket done and reuses
//! the batch slot for the draw's next primitive range.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::draw::assembly;
use crate::draw::query::Query;
use crate::draw::{TaskEvents, BATCH_SIZE};
use crate::pipeline::context::{VertexStream, PUSH_CONSTANT_BYTES};
use crate::pipeline::routine::{
    PixelRoutineHandle, SetupRoutineHandle, TransformedVertex, VertexArgs, VertexRoutineHandle,
};
use crate::pipeline::state::{
    BlendState, DepthState, IndexType, ProvokingVertex, StencilState, Topology, MAX_COLOR_TARGETS,
};
use crate::raster::primitive::CLUSTER_COUNT;
use crate::raster::{
    rasterize_cluster, AttachmentView, PixelParams, Primitive, SetupParams, Triangle,
};
use crate::task::{Loan, Scheduler, Ticket, WaitGroup};

/// Per-draw data consumed by the pixel stage.
pub(crate) struct DrawData {
    pub setup: SetupParams,
    pub color_targets: Vec<AttachmentView>,
    pub depth_target: Option<AttachmentView>,
    pub stencil_target: Option<AttachmentView>,
    pub depth_state: DepthState,
    pub stencil_state: StencilState,
    pub blend: [BlendState; MAX_COLOR_TARGETS],
    pub blend_constants: [f32; 4],
    pub push_constants: [u8; PUSH_CONSTANT_BYTES],
    pub sample_count: u32,
    /// Per-cluster sample counters; published once per pixel task, summed
    /// at retirement.
    pub occlusion: [AtomicU32; CLUSTER_COUNT],
}

impl Default for DrawData {
    fn default() -> Self {
        Self {
            setup: SetupParams::default(),
            color_targets: Vec::new(),
            depth_target: None,
            stencil_target: None,
            depth_state: DepthState::default(),
            stencil_state: StencilState::default(),
            blend: [BlendState::default(); MAX_COLOR_TARGETS],
            blend_constants: [0.0; 4],
            push_constants: [0; PUSH_CONSTANT_BYTES],
            sample_count: 1,
            occlusion: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }
}

/// One submitted draw, loaned from the renderer's DrawCall pool.
#[derive(Default)]
pub(crate) struct DrawCall {
    pub id: u64,
    pub topology: Topology,
    pub index_type: IndexType,
    pub provoking_vertex: ProvokingVertex,
    pub base_vertex: i32,
    pub instance_id: u32,
    pub streams: Vec<VertexStream>,
    pub index_buffer: Option<Arc<Vec<u8>>>,
    pub index_offset: usize,
    pub vertex_routine: Option<VertexRoutineHandle>,
    pub setup_routine: Option<SetupRoutineHandle>,
    pub pixel_routine: Option<PixelRoutineHandle>,
    pub data: DrawData,
    pub num_primitives: u32,
    pub num_batches: u32,
    pub batch_tickets: Vec<Ticket>,
    pub events: Option<Arc<dyn TaskEvents>>,
    pub queries: Vec<Arc<Query>>,
    pub in_flight: Option<WaitGroup>,
    pub next_batch: AtomicU32,
    pub batches_done: AtomicU32,
}

impl DrawCall {
    /// Clears progress state before a new draw reuses the slot.
    pub fn begin(&mut self, id: u64) {
        self.id = id;
        self.batch_tickets.clear();
        self.queries.clear();
        self.next_batch = AtomicU32::new(0);
        self.batches_done = AtomicU32::new(0);
        for counter in &self.data.occlusion {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn occlusion_sum(&self) -> u64 {
        self.data
            .occlusion
            .iter()
            .map(|c| u64::from(c.load(Ordering::Acquire)))
            .sum()
    }
}

/// The mutable body of a batch, owned by one stage at a time.
#[derive(Default)]
pub(crate) struct BatchBody {
    pub id: u32,
    pub first_primitive: u32,
    pub num_primitives: u32,
    pub num_visible: usize,
    pub elements: Vec<u32>,
    pub provoking: Vec<usize>,
    pub vertices: Vec<TransformedVertex>,
    pub triangles: Vec<Triangle>,
    pub primitives: Vec<Primitive>,
}

/// A pooled batch slot.
#[derive(Default)]
pub(crate) struct BatchData {
    pub body: RwLock<BatchBody>,
    pub pending_clusters: AtomicU32,
}

fn write_body(batch: &BatchData) -> std::sync::RwLockWriteGuard<'_, BatchBody> {
    batch
        .body
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn read_body(batch: &BatchData) -> std::sync::RwLockReadGuard<'_, BatchBody> {
    batch
        .body
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Claims the draw's next primitive range for `batch` and schedules its
/// vertex task. Returns the loan to the pool when the draw has no ranges
/// left.
pub(crate) fn launch_batch(
    scheduler: &Arc<Scheduler>,
    draw: Loan<DrawCall>,
    batch: Loan<BatchData>,
) {
    let batch_id = draw.next_batch.fetch_add(1, Ordering::AcqRel);
    if batch_id >= draw.num_batches {
        return;
    }
    {
        let mut body = write_body(&batch);
        body.id = batch_id;
        body.first_primitive = batch_id * BATCH_SIZE as u32;
        body.num_primitives = (draw.num_primitives - body.first_primitive).min(BATCH_SIZE as u32);
        body.num_visible = 0;
    }
    let chained = Arc::clone(scheduler);
    scheduler.spawn(move || process_vertices(&chained, draw, batch));
}

/// Vertex stage: resolves indices, runs the vertex routine, assembles
/// triangles, and chains primitive assembly.
fn process_vertices(scheduler: &Arc<Scheduler>, draw: Loan<DrawCall>, batch: Loan<BatchData>) {
    {
        let mut guard = write_body(&batch);
        let body = &mut *guard;
        assembly::batch_elements(
            draw.topology,
            draw.provoking_vertex,
            body.first_primitive,
            body.num_primitives,
            &mut body.elements,
            &mut body.provoking,
        );
        if draw.index_type != IndexType::Sequential {
            if let Some(index_buffer) = &draw.index_buffer {
                for element in &mut body.elements {
                    *element = assembly::fetch_index(
                        index_buffer,
                        draw.index_type,
                        draw.index_offset,
                        *element,
                    );
                }
            }
        }

        body.vertices.clear();
        body.vertices
            .resize(body.elements.len(), TransformedVertex::default());
        if let Some(routine) = &draw.vertex_routine {
            routine.execute(&mut VertexArgs {
                streams: &draw.streams,
                indices: &body.elements,
                base_vertex: draw.base_vertex,
                instance_id: draw.instance_id,
                push_constants: &draw.data.push_constants,
                outputs: &mut body.vertices,
            });
        }

        body.triangles.clear();
        for (i, &slot) in body.provoking.iter().enumerate() {
            body.triangles.push(Triangle {
                v: [
                    body.vertices[i * assembly::CORNERS],
                    body.vertices[i * assembly::CORNERS + 1],
                    body.vertices[i * assembly::CORNERS + 2],
                ],
                provoking: slot,
            });
        }
        log::trace!(
            "draw {} batch {}: {} primitives transformed",
            draw.id,
            body.id,
            body.num_primitives
        );
    }
    let chained = Arc::clone(scheduler);
    scheduler.spawn(move || process_primitives(&chained, draw, batch));
}

/// Primitive stage: fixed-function setup, then registers the pixel stage on
/// the batch's ticket.
fn process_primitives(scheduler: &Arc<Scheduler>, draw: Loan<DrawCall>, batch: Loan<BatchData>) {
    let (batch_id, num_visible, cluster_mask) = {
        let mut guard = write_body(&batch);
        let body = &mut *guard;
        body.primitives.clear();
        let num_visible = match &draw.setup_routine {
            Some(setup) => setup.setup(&body.triangles, &mut body.primitives, &draw.data.setup),
            None => 0,
        };
        body.num_visible = num_visible;
        let mask = body.primitives[..num_visible]
            .iter()
            .fold(0_u16, |m, p| m | p.cluster_mask);
        (body.id, num_visible, mask)
    };
    log::trace!(
        "draw {} batch {}: {} visible primitives, clusters {:#06x}",
        draw.id,
        batch_id,
        num_visible,
        cluster_mask
    );

    let ticket = draw.batch_tickets[batch_id as usize].clone();
    if num_visible == 0 || cluster_mask == 0 || draw.pixel_routine.is_none() {
        // Nothing to rasterize; retire the batch in ticket order.
        let chained = Arc::clone(scheduler);
        let release = ticket.clone();
        ticket.on_call(move || {
            release.done();
            finish_batch(&chained, draw, batch);
        });
        return;
    }

    batch
        .pending_clusters
        .store(cluster_mask.count_ones(), Ordering::Release);
    let chained = Arc::clone(scheduler);
    ticket.on_call(move || {
        for cluster in 0..CLUSTER_COUNT {
            if cluster_mask & (1 << cluster) == 0 {
                continue;
            }
            let scheduler = Arc::clone(&chained);
            let draw = draw.clone();
            let batch = batch.clone();
            chained.spawn(move || process_pixels(&scheduler, draw, batch, cluster));
        }
    });
}

/// Pixel stage: rasterizes the batch's visible primitives within one
/// cluster strip.
fn process_pixels(
    scheduler: &Arc<Scheduler>,
    draw: Loan<DrawCall>,
    batch: Loan<BatchData>,
    cluster: usize,
) {
    let batch_id;
    let mut occlusion = 0_u32;
    {
        let body = read_body(&batch);
        batch_id = body.id;
        if let Some(routine) = &draw.pixel_routine {
            let params = PixelParams {
                routine: routine.as_ref(),
                color_targets: &draw.data.color_targets,
                depth_target: draw.data.depth_target.as_ref(),
                stencil_target: draw.data.stencil_target.as_ref(),
                depth_state: draw.data.depth_state,
                stencil_state: draw.data.stencil_state,
                blend: draw.data.blend,
                blend_constants: draw.data.blend_constants,
                scissor: draw.data.setup.scissor,
                target_width: draw.data.setup.target_width,
                target_height: draw.data.setup.target_height,
                sample_count: draw.data.sample_count,
                push_constants: &draw.data.push_constants,
            };
            for primitive in &body.primitives[..body.num_visible] {
                if primitive.cluster_mask & (1 << cluster) != 0 {
                    occlusion += rasterize_cluster(primitive, cluster, &params);
                }
            }
        }
    }
    draw.data.occlusion[cluster].fetch_add(occlusion, Ordering::AcqRel);

    if batch.pending_clusters.fetch_sub(1, Ordering::AcqRel) == 1 {
        // Last cluster of the batch: release the ticket and recycle.
        draw.batch_tickets[batch_id as usize].done();
        finish_batch(scheduler, draw, batch);
    }
}

/// Batch retirement: recycle the slot for the draw's next range, and retire
/// the draw when this was its final batch.
fn finish_batch(scheduler: &Arc<Scheduler>, draw: Loan<DrawCall>, batch: Loan<BatchData>) {
    launch_batch(scheduler, draw.clone(), batch);
    let done = draw.batches_done.fetch_add(1, Ordering::AcqRel) + 1;
    if done == draw.num_batches {
        retire(&draw);
    }
}

/// Draw retirement: queries, events, and the in-flight counter.
fn retire(draw: &DrawCall) {
    let occlusion = draw.occlusion_sum();
    for query in &draw.queries {
        query.resolve(occlusion);
    }
    log::trace!("draw {} retired, occlusion {}", draw.id, occlusion);
    if let Some(events) = &draw.events {
        events.finish();
    }
    if let Some(in_flight) = &draw.in_flight {
        in_flight.done();
    }
}
