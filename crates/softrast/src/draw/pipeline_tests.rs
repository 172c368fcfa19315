//! End-to-end tests for the draw pipeline
//!
//! These drive full draws through vertex transform, setup, rasterization,
//! depth-stencil, blending, and retirement, and check the resulting
//! framebuffer bytes.

#![allow(clippy::many_single_char_names)]

use std::sync::Arc;

use crate::config::ProcessorConfig;
use crate::draw::{NopTaskEvents, Query, QueryType, Renderer};
use crate::foundation::math::Vec4;
use crate::pipeline::reference::{
    pack_vertices, AttributePixel, InterleavedVertex, SolidPixel, INTERLEAVED_STRIDE,
};
use crate::pipeline::state::{BlendFactor, BlendOp, BlendState, CompareOp, DepthState};
use crate::pipeline::{DrawContext, IndexType, Topology, VertexStream};
use crate::raster::{Format, ImageBuffer, Scissor, Viewport};
use crate::task::Scheduler;

fn white() -> Vec4 {
    Vec4::new(1.0, 1.0, 1.0, 1.0)
}

fn renderer_for(workers: u32) -> Renderer {
    let scheduler = if workers == 0 {
        Scheduler::single_threaded()
    } else {
        Scheduler::new(&ProcessorConfig {
            thread_count: workers,
            ..ProcessorConfig::default()
        })
    };
    Renderer::new(Arc::new(scheduler))
}

fn stream_of(vertices: &[(Vec4, Vec4)]) -> VertexStream {
    VertexStream {
        data: Arc::new(pack_vertices(vertices)),
        stride: INTERLEAVED_STRIDE,
        ..VertexStream::default()
    }
}

/// The centred triangle from the single-triangle scenario: base across the
/// top row, apex at the bottom middle.
fn centred_triangle(color: Vec4) -> VertexStream {
    stream_of(&[
        (Vec4::new(-1.0, -1.0, 0.5, 1.0), color),
        (Vec4::new(1.0, -1.0, 0.5, 1.0), color),
        (Vec4::new(0.0, 1.0, 0.5, 1.0), color),
    ])
}

/// A triangle covering the whole viewport.
fn full_cover_triangle(color: Vec4, z: f32) -> VertexStream {
    stream_of(&[
        (Vec4::new(-1.0, -1.0, z, 1.0), color),
        (Vec4::new(3.0, -1.0, z, 1.0), color),
        (Vec4::new(-1.0, 3.0, z, 1.0), color),
    ])
}

fn base_context(target: &ImageBuffer) -> DrawContext {
    DrawContext {
        attribute_count: 1,
        vertex_routine: Some(Arc::new(InterleavedVertex)),
        pixel_routine: Some(Arc::new(AttributePixel)),
        color_targets: vec![target.view()],
        ..DrawContext::default()
    }
}

fn pixel(bytes: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let at = ((y * width + x) * 4) as usize;
    bytes[at..at + 4].try_into().unwrap()
}

#[test]
fn single_opaque_triangle_on_a_4x4_target() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(4, 4));
    renderer.set_scissor(Scissor::covering(4, 4));
    let target = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 1);

    let mut context = base_context(&target);
    context.streams = vec![centred_triangle(white())];
    context.pixel_routine = Some(Arc::new(SolidPixel { color: white() }));
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    let bytes = target.to_bytes();
    let white = [255, 255, 255, 255];
    let black = [0, 0, 0, 0];
    // The centre quad is covered.
    for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
        assert_eq!(pixel(&bytes, 4, x, y), white, "pixel ({x}, {y})");
    }
    // The apex row touches no pixel centres; its corners stay clear.
    for (x, y) in [(0, 3), (3, 3), (0, 2), (3, 1)] {
        assert_eq!(pixel(&bytes, 4, x, y), black, "pixel ({x}, {y})");
    }
}

#[test]
fn two_overlapping_draws_keep_submission_order() {
    for workers in [0, 1, 4] {
        let renderer = renderer_for(workers);
        renderer.set_viewport(Viewport::covering(8, 8));
        renderer.set_scissor(Scissor::covering(8, 8));
        let target = ImageBuffer::new(Format::Rgba8Unorm, 8, 8, 1);

        let mut context = base_context(&target);
        for _ in 0..8 {
            context.streams = vec![full_cover_triangle(Vec4::new(1.0, 0.0, 0.0, 1.0), 0.5)];
            renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
            context.streams = vec![full_cover_triangle(Vec4::new(0.0, 1.0, 0.0, 1.0), 0.5)];
            renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
        }
        renderer.synchronize();

        let bytes = target.to_bytes();
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(
                    pixel(&bytes, 8, x, y),
                    [0, 255, 0, 255],
                    "workers {workers}, pixel ({x}, {y})"
                );
            }
        }
    }
}

#[test]
fn output_is_identical_across_worker_counts() {
    let mut reference_bytes = None;
    for workers in [0, 1, 2, 8] {
        let renderer = renderer_for(workers);
        renderer.set_viewport(Viewport::covering(16, 16));
        renderer.set_scissor(Scissor::covering(16, 16));
        let target = ImageBuffer::new(Format::Rgba8Unorm, 16, 16, 1);

        let mut context = base_context(&target);
        context.streams = vec![stream_of(&[
            (Vec4::new(-0.9, -0.9, 0.5, 1.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
            (Vec4::new(0.9, -0.6, 0.5, 1.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
            (Vec4::new(0.0, 0.9, 0.5, 1.0), Vec4::new(0.0, 0.0, 1.0, 1.0)),
        ])];
        renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
        renderer.synchronize();

        let bytes = target.to_bytes();
        match &reference_bytes {
            None => reference_bytes = Some(bytes),
            Some(reference) => {
                assert_eq!(reference, &bytes, "workers {workers} diverged");
            }
        }
    }
}

#[test]
fn depth_test_keeps_the_nearer_draw() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(4, 4));
    renderer.set_scissor(Scissor::covering(4, 4));
    let color = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 1);
    let depth = ImageBuffer::new(Format::Depth32Float, 4, 4, 1);
    let depth_view = depth.view();
    for y in 0..4 {
        for x in 0..4 {
            depth_view.write_depth(x, y, 0, 1.0);
        }
    }

    let mut context = base_context(&color);
    context.depth_target = Some(depth.view());
    context.depth = DepthState {
        test_enable: true,
        write_enable: true,
        compare_op: CompareOp::Less,
    };

    // Near draw first, far draw second: the far one must lose everywhere.
    context.streams = vec![full_cover_triangle(Vec4::new(0.0, 1.0, 0.0, 1.0), 0.2)];
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    context.streams = vec![full_cover_triangle(Vec4::new(1.0, 0.0, 0.0, 1.0), 0.8)];
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    let bytes = color.to_bytes();
    assert_eq!(pixel(&bytes, 4, 2, 2), [0, 255, 0, 255]);
    assert_eq!(depth.view().read_depth(2, 2, 0), 0.2);
}

#[test]
fn occlusion_query_counts_covered_samples() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(4, 4));
    renderer.set_scissor(Scissor::covering(4, 4));
    let target = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 1);

    let query = Arc::new(Query::new(QueryType::Occlusion));
    renderer.add_query(Arc::clone(&query));

    let mut context = base_context(&target);
    context.streams = vec![centred_triangle(white())];
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    // Row 0 contributes four samples, rows 1 and 2 two each.
    assert_eq!(query.value(), 8);
    assert!(query.is_finished());
}

#[test]
fn draws_behind_the_near_plane_write_nothing() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(4, 4));
    renderer.set_scissor(Scissor::covering(4, 4));
    let target = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 1);

    let mut context = base_context(&target);
    context.streams = vec![stream_of(&[
        (Vec4::new(-1.0, -1.0, -1.0, 1.0), white()),
        (Vec4::new(1.0, -1.0, -2.0, 1.0), white()),
        (Vec4::new(0.0, 1.0, -1.5, 1.0), white()),
    ])];
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    assert!(target.to_bytes().iter().all(|&b| b == 0));
}

#[test]
fn scissor_limits_writes() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(8, 8));
    renderer.set_scissor(Scissor {
        x: 2,
        y: 2,
        width: 4,
        height: 4,
    });
    let target = ImageBuffer::new(Format::Rgba8Unorm, 8, 8, 1);

    let mut context = base_context(&target);
    context.streams = vec![full_cover_triangle(white(), 0.5)];
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    let bytes = target.to_bytes();
    assert_eq!(pixel(&bytes, 8, 3, 3), [255, 255, 255, 255]);
    assert_eq!(pixel(&bytes, 8, 1, 3), [0, 0, 0, 0]);
    assert_eq!(pixel(&bytes, 8, 3, 6), [0, 0, 0, 0]);
}

#[test]
fn alpha_blending_mixes_with_the_destination() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(4, 4));
    renderer.set_scissor(Scissor::covering(4, 4));
    let target = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 1);

    let mut context = base_context(&target);
    context.streams = vec![full_cover_triangle(Vec4::new(1.0, 0.0, 0.0, 1.0), 0.5)];
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));

    context.blend[0] = BlendState {
        enabled: true,
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::OneMinusSrcAlpha,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::Zero,
        alpha_op: BlendOp::Add,
        ..BlendState::default()
    };
    context.streams = vec![full_cover_triangle(Vec4::new(0.0, 0.0, 1.0, 0.5), 0.5)];
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    let [r, g, b, _] = pixel(&target.to_bytes(), 4, 2, 2);
    assert!((125..=130).contains(&r), "red was {r}");
    assert_eq!(g, 0);
    assert!((125..=130).contains(&b), "blue was {b}");
}

#[test]
fn triangle_strips_expand_to_a_quad() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(4, 4));
    renderer.set_scissor(Scissor::covering(4, 4));
    let target = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 1);

    let mut context = base_context(&target);
    context.topology = Topology::TriangleStrip;
    context.streams = vec![stream_of(&[
        (Vec4::new(-1.0, -1.0, 0.5, 1.0), white()),
        (Vec4::new(1.0, -1.0, 0.5, 1.0), white()),
        (Vec4::new(-1.0, 1.0, 0.5, 1.0), white()),
        (Vec4::new(1.0, 1.0, 0.5, 1.0), white()),
    ])];
    renderer.draw(&context, IndexType::Sequential, 4, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    let bytes = target.to_bytes();
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(pixel(&bytes, 4, x, y), [255, 255, 255, 255], "({x}, {y})");
        }
    }
}

#[test]
fn indexed_draws_follow_the_index_buffer() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(4, 4));
    renderer.set_scissor(Scissor::covering(4, 4));
    let target = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 1);

    // Vertex 0 is a decoy; indices 1..4 describe the centred triangle.
    let mut context = base_context(&target);
    context.pixel_routine = Some(Arc::new(SolidPixel { color: white() }));
    context.streams = vec![stream_of(&[
        (Vec4::new(0.0, 0.0, 0.0, 1.0), white()),
        (Vec4::new(-1.0, -1.0, 0.5, 1.0), white()),
        (Vec4::new(1.0, -1.0, 0.5, 1.0), white()),
        (Vec4::new(0.0, 1.0, 0.5, 1.0), white()),
    ])];
    context.index_buffer = Some(Arc::new(vec![1, 0, 2, 0, 3, 0]));
    renderer.draw(&context, IndexType::U16, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    let bytes = target.to_bytes();
    assert_eq!(pixel(&bytes, 4, 1, 1), [255, 255, 255, 255]);
    assert_eq!(pixel(&bytes, 4, 0, 3), [0, 0, 0, 0]);
}

#[test]
fn multisampled_targets_receive_every_sample() {
    let renderer = renderer_for(0);
    renderer.set_viewport(Viewport::covering(4, 4));
    renderer.set_scissor(Scissor::covering(4, 4));
    let target = ImageBuffer::new(Format::Rgba8Unorm, 4, 4, 4);

    let mut context = base_context(&target);
    context.sample_count = 4;
    context.streams = vec![full_cover_triangle(white(), 0.5)];
    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    let view = target.view();
    for sample in 0..4 {
        assert_eq!(view.read_color(2, 2, sample).x, 1.0, "sample {sample}");
    }
}

#[test]
fn many_batches_retire_in_order() {
    // 600 primitives force multiple batches through the recycling path.
    let renderer = renderer_for(2);
    renderer.set_viewport(Viewport::covering(8, 8));
    renderer.set_scissor(Scissor::covering(8, 8));
    let target = ImageBuffer::new(Format::Rgba8Unorm, 8, 8, 1);

    let mut vertices = Vec::new();
    for _ in 0..599 {
        // Degenerate fillers that rasterize nothing.
        vertices.push((Vec4::new(0.0, 0.0, 0.5, 1.0), white()));
        vertices.push((Vec4::new(0.0, 0.0, 0.5, 1.0), white()));
        vertices.push((Vec4::new(0.0, 0.0, 0.5, 1.0), white()));
    }
    vertices.push((Vec4::new(-1.0, -1.0, 0.5, 1.0), white()));
    vertices.push((Vec4::new(3.0, -1.0, 0.5, 1.0), white()));
    vertices.push((Vec4::new(-1.0, 3.0, 0.5, 1.0), white()));

    let mut context = base_context(&target);
    context.pixel_routine = Some(Arc::new(SolidPixel { color: white() }));
    context.streams = vec![stream_of(&vertices)];
    renderer.draw(
        &context,
        IndexType::Sequential,
        600 * 3,
        0,
        Arc::new(NopTaskEvents),
    );
    renderer.synchronize();

    let bytes = target.to_bytes();
    assert_eq!(pixel(&bytes, 8, 4, 4), [255, 255, 255, 255]);
}
