//! Face Detection Benchmarks
//!
//! Measures the post-detection steps run on every frame.
//!
//! # Running Benchmarks
//! ```bash
//! cargo bench --package facetrack-media --bench face_detection
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use facetrack_media::detection::{to_portraits, DetectionSet, DEFAULT_OVERLAP_PCT};
use facetrack_media::BoundingBox;
use std::time::Duration;

/// Deterministic set of clustered boxes, several per cluster.
fn create_detections(count: usize) -> Vec<BoundingBox> {
    (0..count)
        .map(|i| {
            let cluster = (i / 4) as u32;
            let jitter = (i % 4) as u32 * 3;
            let x = (cluster * 90) % 1700 + jitter;
            let y = (cluster * 37) % 900 + jitter;
            let confidence = 0.2 + ((i * 7) % 80) as f32 / 100.0;
            BoundingBox::new(x, y, 80 + jitter, 90 + jitter)
                .and_then(|b| b.with_confidence(confidence))
                .expect("valid box")
        })
        .collect()
}

fn bench_filter_overlapped(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_overlapped");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for count in [4, 16, 64, 256] {
        let boxes = create_detections(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("boxes", count), &boxes, |b, boxes| {
            b.iter(|| {
                let mut set = DetectionSet::from_boxes(black_box(boxes.clone()));
                set.filter_overlapped(DEFAULT_OVERLAP_PCT);
                black_box(set.len())
            })
        });
    }

    group.finish();
}

fn bench_portrait(c: &mut Criterion) {
    let mut group = c.benchmark_group("portrait");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    let resolutions = [(1920u32, 1080u32), (1280, 720), (640, 360)];
    for (width, height) in resolutions {
        let boxes: Vec<BoundingBox> = create_detections(32)
            .into_iter()
            .filter_map(|b| b.clamp_to(width, height))
            .collect();
        group.throughput(Throughput::Elements(boxes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("to_portraits", format!("{}x{}", width, height)),
            &boxes,
            |b, boxes| {
                b.iter(|| {
                    let mut boxes = boxes.clone();
                    to_portraits(black_box(&mut boxes), width, height).expect("portrait");
                    black_box(boxes)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_filter_overlapped, bench_portrait);
criterion_main!(benches);
