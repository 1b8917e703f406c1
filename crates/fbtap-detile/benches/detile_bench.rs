//! Criterion benchmarks for the detiling transform.
//!
//! Run with: `cargo bench -p fbtap-detile`
//! Quick compile check: `cargo bench -p fbtap-detile -- --test`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use fbtap_core::TilingLayout;
use fbtap_detile::{detile, tile};

/// A 1920×1080 gradient, 4 bytes per pixel.
fn make_frame() -> Vec<u8> {
    (0..1920 * 1080 * 4).map(|i: usize| (i % 251) as u8).collect()
}

fn bench_detile(c: &mut Criterion) {
    let mut group = c.benchmark_group("detile_1080p");
    let (w, h, pitch) = (1920u32, 1080u32, 7680u32);
    let frame = make_frame();
    group.throughput(Throughput::Bytes(frame.len() as u64));

    let mut dst = vec![0u8; frame.len()];
    group.bench_function("linear_copy", |b| {
        b.iter(|| detile(black_box(&frame), &mut dst, w, h, pitch, TilingLayout::Linear));
    });

    for layout in [TilingLayout::X, TilingLayout::Y] {
        let tiled = tile(&frame, w, h, pitch, layout).expect("tile test frame");
        group.bench_function(layout.name(), |b| {
            b.iter(|| detile(black_box(&tiled), &mut dst, w, h, pitch, layout));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_detile);
criterion_main!(benches);
