use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wipecast_core::{BoundaryPosition, Color, FrameBuffer};
use wipecast_render::{composite, CompositeStyle, FittedImage, ImageHandle, WipeCompositor};

fn gradient(width: u32, height: u32) -> FrameBuffer {
    let mut fb = FrameBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            fb.set_pixel(x, y, [r, g, 128, 255]);
        }
    }
    fb
}

fn bench_composite_hd(c: &mut Criterion) {
    let base = FittedImage::fit(&gradient(1600, 900), 1280, 720);
    let overlay = FittedImage::fit(&FrameBuffer::solid(900, 1200, &Color::BLUE), 1280, 720);
    let style = CompositeStyle::default();
    let mut canvas = FrameBuffer::new(1280, 720);
    let mut step = 0u32;

    c.bench_function("composite_1280x720", |b| {
        b.iter(|| {
            step = (step + 1) % 101;
            let boundary = BoundaryPosition::new(step as f64);
            composite(&mut canvas, &base, &overlay, boundary, &style).unwrap();
            black_box(&canvas);
        })
    });
}

fn bench_fit(c: &mut Criterion) {
    let image = gradient(1600, 900);
    c.bench_function("fit_1600x900_to_1280x720", |b| {
        b.iter(|| black_box(FittedImage::fit(&image, 1280, 720)))
    });
}

fn bench_wipe_compositor_scripted(c: &mut Criterion) {
    let base = ImageHandle::from_frame(gradient(640, 480), "base");
    let overlay = ImageHandle::from_frame(FrameBuffer::solid(640, 480, &Color::RED), "overlay");

    let mut group = c.benchmark_group("wipe_compositor");
    group.sample_size(10);
    group.bench_function("30_frames_1280x720", |b| {
        b.iter(|| {
            let mut compositor =
                WipeCompositor::new(base.clone(), overlay.clone(), CompositeStyle::default());
            let mut canvas = FrameBuffer::new(1280, 720);
            for i in 0..30 {
                let boundary = BoundaryPosition::new(100.0 - i as f64 * 100.0 / 29.0);
                compositor.render(&mut canvas, boundary).unwrap();
            }
            black_box(canvas)
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_composite_hd,
    bench_fit,
    bench_wipe_compositor_scripted
);
criterion_main!(benches);
