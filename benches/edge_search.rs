//! Benchmarks for ingest and edge queries
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logicstore_rs::capture::encode::ReplayStream;
use logicstore_rs::config::{SignalShape, SignalSpec};
use logicstore_rs::{CaptureConfig, LogicSnapshot, Pattern, ReplaySettings, Term};
use std::sync::atomic::AtomicBool;

const SAMPLES: u64 = 16 << 20;

fn settings(samples: u64, loop_mode: bool) -> ReplaySettings {
    ReplaySettings {
        capture: CaptureConfig::new(vec![0, 1, 2, 3], samples, loop_mode),
        samples,
        chunk_bytes: 64 * 1024,
        signals: vec![
            SignalSpec {
                channel: 0,
                shape: SignalShape::Step { at: samples - 1_000 },
            },
            SignalSpec {
                channel: 1,
                shape: SignalShape::Square { half_period: 3 },
            },
            SignalSpec {
                channel: 2,
                shape: SignalShape::Pulse { period: 100_000 },
            },
            SignalSpec {
                channel: 3,
                shape: SignalShape::Constant { level: true },
            },
        ],
    }
}

fn chunks(settings: &ReplaySettings) -> Vec<Vec<u8>> {
    ReplayStream::new(settings).collect()
}

fn ingest(settings: &ReplaySettings, chunks: &[Vec<u8>]) -> LogicSnapshot {
    let snapshot = LogicSnapshot::new();
    snapshot
        .first_payload(&settings.capture)
        .expect("valid settings");
    for chunk in chunks {
        snapshot.append_payload(chunk).expect("append failed");
    }
    snapshot.capture_ended().expect("end failed");
    snapshot
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    group.sample_size(10);

    for samples in [1u64 << 20, 4 << 20].iter() {
        let settings = settings(*samples, false);
        let data = chunks(&settings);
        group.throughput(Throughput::Bytes(ReplayStream::new(&settings).total_bytes()));
        group.bench_with_input(BenchmarkId::new("cross", samples), &data, |b, data| {
            b.iter(|| black_box(ingest(&settings, data)));
        });
    }

    // reuse of recycled buffers across runs
    let settings = settings(4 << 20, false);
    let data = chunks(&settings);
    let snapshot = LogicSnapshot::new();
    group.bench_function("restart_same_geometry", |b| {
        b.iter(|| {
            snapshot.first_payload(&settings.capture).expect("valid settings");
            for chunk in &data {
                snapshot.append_payload(chunk).expect("append failed");
            }
        });
    });

    group.finish();
}

fn bench_next_edge(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_edge");
    let settings = settings(SAMPLES, false);
    let snapshot = ingest(&settings, &chunks(&settings));
    let last = SAMPLES - 1;

    // sparse edge near the end, dense edges everywhere
    for channel in [0u16, 1, 2].iter() {
        group.bench_with_input(BenchmarkId::new("exact", channel), channel, |b, &channel| {
            b.iter(|| black_box(snapshot.next_edge(channel, black_box(1), last, 0)));
        });
    }
    group.bench_function("prev_sparse", |b| {
        b.iter(|| black_box(snapshot.prev_edge(2, black_box(last), 0)));
    });
    group.bench_function("constant_channel", |b| {
        b.iter(|| black_box(snapshot.next_edge(3, black_box(0), last, 0)));
    });

    group.finish();
}

fn bench_display_edges(c: &mut Criterion) {
    let mut group = c.benchmark_group("display_edges");
    let settings = settings(SAMPLES, false);
    let snapshot = ingest(&settings, &chunks(&settings));
    let last = SAMPLES - 1;

    for width in [800usize, 4000].iter() {
        let spp = SAMPLES / *width as u64;
        group.throughput(Throughput::Elements(*width as u64));
        group.bench_with_input(BenchmarkId::new("dense", width), width, |b, &width| {
            b.iter(|| black_box(snapshot.display_edges(1, 0, last, width, 64, spp)));
        });
        group.bench_with_input(BenchmarkId::new("sparse", width), width, |b, &width| {
            b.iter(|| black_box(snapshot.display_edges(2, 0, last, width, 64, spp)));
        });
    }

    group.finish();
}

fn bench_pattern_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_search");
    group.sample_size(10);
    let settings = settings(SAMPLES, false);
    let snapshot = ingest(&settings, &chunks(&settings));
    let stop = AtomicBool::new(false);

    let sparse = Pattern::new().with(0, Term::High).with(2, Term::Rising);
    group.bench_function("sparse_forward", |b| {
        b.iter(|| black_box(snapshot.pattern_search(&sparse, 0, SAMPLES - 1, true, &stop)));
    });
    let dense = Pattern::new().with(1, Term::Rising).with(0, Term::High);
    group.bench_function("dense_backward", |b| {
        b.iter(|| black_box(snapshot.pattern_search(&dense, 0, SAMPLES - 1, false, &stop)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_ingest,
    bench_next_edge,
    bench_display_edges,
    bench_pattern_search
);
criterion_main!(benches);
