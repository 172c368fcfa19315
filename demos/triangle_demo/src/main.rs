//! Renders a single triangle through the full draw pipeline and writes the
//! result to `triangle.png`.
//!
//! Worker count and affinity come from `softrast.toml` when present
//! (`[processor]` section); a missing or malformed file falls back to
//! defaults.

use std::sync::Arc;

use softrast::config::ProcessorConfig;
use softrast::draw::{NopTaskEvents, Renderer};
use softrast::foundation::math::Vec4;
use softrast::pipeline::reference::{
    pack_vertices, AttributePixel, InterleavedVertex, INTERLEAVED_STRIDE,
};
use softrast::pipeline::{DrawContext, IndexType, VertexStream};
use softrast::raster::{Format, ImageBuffer, Scissor, Viewport};
use softrast::task::Scheduler;
use softrast::wsi::{HeadlessPresenter, Presenter};

const SIZE: u32 = 256;

fn main() {
    env_logger::init();

    let config = ProcessorConfig::load_or_default("softrast.toml");
    let scheduler = Arc::new(Scheduler::new(&config));
    log::info!("rendering on {} workers", scheduler.worker_count());

    let renderer = Renderer::new(Arc::clone(&scheduler));
    renderer.set_viewport(Viewport::covering(SIZE, SIZE));
    renderer.set_scissor(Scissor::covering(SIZE, SIZE));

    let target = ImageBuffer::new(Format::Rgba8Unorm, SIZE, SIZE, 1);

    let vertices = pack_vertices(&[
        (
            Vec4::new(-0.8, 0.8, 0.5, 1.0),
            Vec4::new(1.0, 0.2, 0.2, 1.0),
        ),
        (
            Vec4::new(0.8, 0.8, 0.5, 1.0),
            Vec4::new(0.2, 1.0, 0.2, 1.0),
        ),
        (
            Vec4::new(0.0, -0.8, 0.5, 1.0),
            Vec4::new(0.2, 0.2, 1.0, 1.0),
        ),
    ]);

    let context = DrawContext {
        streams: vec![VertexStream {
            data: Arc::new(vertices),
            stride: INTERLEAVED_STRIDE,
            ..VertexStream::default()
        }],
        attribute_count: 1,
        vertex_routine: Some(Arc::new(InterleavedVertex)),
        pixel_routine: Some(Arc::new(AttributePixel)),
        color_targets: vec![target.view()],
        ..DrawContext::default()
    };

    renderer.draw(&context, IndexType::Sequential, 3, 0, Arc::new(NopTaskEvents));
    renderer.synchronize();

    let presenter = HeadlessPresenter::new();
    presenter.present(&target.view());

    let frame = presenter.last_frame();
    match image::RgbaImage::from_raw(SIZE, SIZE, frame) {
        Some(img) => {
            if let Err(err) = img.save("triangle.png") {
                log::error!("failed to write triangle.png: {err}");
                std::process::exit(1);
            }
            log::info!("wrote triangle.png");
        }
        None => {
            log::error!("presented frame has the wrong size");
            std::process::exit(1);
        }
    }
}
