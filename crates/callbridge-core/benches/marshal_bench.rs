//! Criterion benchmarks for result-record marshaling.
//!
//! Decoded audio and image payloads are the largest values the bridge copies
//! into the shared arena, so these are the paths worth watching.
//!
//! Run with:
//! ```bash
//! cargo bench --package callbridge-core --bench marshal_bench
//! ```

use callbridge_core::marshal::{marshal_audio, marshal_image, marshal_text, to_rgba8};
use callbridge_core::operation::{DecodedAudio, DecodedImage, PixelFormat};
use callbridge_core::record::ResultRecord;
use callbridge_core::SharedArena;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_audio(frames: usize, channels: usize) -> DecodedAudio {
    DecodedAudio {
        sample_rate: 44_100,
        channels: (0..channels)
            .map(|c| (0..frames).map(|i| ((i + c) as f32 * 0.001).sin()).collect())
            .collect(),
    }
}

fn make_image(side: u32, format: PixelFormat) -> DecodedImage {
    let len = (side * side) as usize * format.bytes_per_pixel();
    DecodedImage {
        width: side,
        height: side,
        format,
        pixels: (0..len).map(|i| i as u8).collect(),
    }
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_audio(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal_audio");
    let arena = SharedArena::new(16 * 1024 * 1024);

    for (name, audio) in [
        ("mono_1s", make_audio(44_100, 1)),
        ("stereo_1s", make_audio(44_100, 2)),
        ("surround_1s", make_audio(44_100, 6)),
    ] {
        group.bench_with_input(BenchmarkId::new("clip", name), &audio, |b, audio| {
            b.iter(|| {
                let rec = marshal_audio(&arena, black_box(audio)).expect("marshal must succeed");
                rec.release(&arena);
            })
        });
    }

    group.finish();
}

fn bench_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal_image");
    let arena = SharedArena::new(16 * 1024 * 1024);

    for (name, format) in [
        ("rgba8", PixelFormat::Rgba8),
        ("bgra8", PixelFormat::Bgra8),
        ("rgb8", PixelFormat::Rgb8),
        ("gray8", PixelFormat::Gray8),
    ] {
        let image = make_image(256, format);
        group.bench_with_input(BenchmarkId::new("256x256", name), &image, |b, image| {
            b.iter(|| {
                let rec = marshal_image(&arena, black_box(image)).expect("marshal must succeed");
                rec.release(&arena);
            })
        });
    }

    group.bench_function("to_rgba8_only_rgb8_512", |b| {
        let image = make_image(512, PixelFormat::Rgb8);
        b.iter(|| to_rgba8(black_box(&image)))
    });

    group.finish();
}

fn bench_text(c: &mut Criterion) {
    let arena = SharedArena::new(1024 * 1024);
    let text = "clipboard contents ".repeat(64);
    c.bench_function("marshal_text_1k", |b| {
        b.iter(|| {
            let rec = marshal_text(&arena, black_box(&text)).expect("marshal must succeed");
            rec.release(&arena);
        })
    });
}

criterion_group!(benches, bench_audio, bench_image, bench_text);
criterion_main!(benches);
