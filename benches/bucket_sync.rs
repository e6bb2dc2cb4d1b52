//! Performance benchmarks for bucket sync against in-memory stores

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use bucketsync::config::SyncOptions;
use bucketsync::store::InMemoryStore;
use bucketsync::sync::{annotate, fingerprints_match};
use bucketsync::{Metadata, ObjectHead, SyncEngine, SyncStatus};

fn populated(objects: usize, mirrored: usize) -> (Arc<InMemoryStore>, Arc<InMemoryStore>) {
    let source = Arc::new(InMemoryStore::new("minio"));
    let destination = Arc::new(InMemoryStore::new("aws"));
    for i in 0..objects {
        let key = format!("data/{:05}.bin", i);
        let body = vec![(i % 251) as u8; 1024];
        source.insert_object("bench", &key, body.clone(), Metadata::new());
        if i < mirrored {
            destination.insert_object("bench", &key, body, Metadata::new());
        }
    }
    (source, destination)
}

fn bench_bucket_sync(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();

    let mut group = c.benchmark_group("bucket_sync");
    group.sample_size(20);

    for concurrency in [1usize, 8] {
        group.throughput(Throughput::Elements(500));
        group.bench_with_input(
            BenchmarkId::new("cold_500", concurrency),
            &concurrency,
            |b, &concurrency| {
                b.iter(|| {
                    let (source, destination) = populated(500, 0);
                    let engine = SyncEngine::new(source, destination).with_options(SyncOptions {
                        concurrency,
                        annotate_skips_in_background: false,
                        page_size: Some(100),
                    });
                    runtime.block_on(engine.sync_bucket("bench", None, None))
                })
            },
        );
    }

    // Everything already mirrored: measures the comparison path alone
    group.bench_function("warm_500_all_skipped", |b| {
        b.iter(|| {
            let (source, destination) = populated(500, 500);
            let engine = SyncEngine::new(source, destination).with_options(SyncOptions {
                annotate_skips_in_background: false,
                ..Default::default()
            });
            runtime.block_on(engine.sync_bucket("bench", None, None))
        })
    });

    group.finish();
}

fn bench_fingerprints(c: &mut Criterion) {
    let source = ObjectHead {
        key: "a".to_string(),
        etag: "\"9b2cf535f27731c974343645a3985328\"".to_string(),
        ..Default::default()
    };
    let destination = ObjectHead {
        etag: "9b2cf535f27731c974343645a3985328".to_string(),
        ..source.clone()
    };

    c.bench_function("fingerprints_match", |b| {
        b.iter(|| fingerprints_match(black_box(Some(&source)), black_box(Some(&destination))))
    });
}

fn bench_annotate(c: &mut Criterion) {
    let mut group = c.benchmark_group("annotate");

    for size in [0usize, 10, 100] {
        let existing: Metadata = (0..size)
            .map(|i| (format!("key-{}", i), format!("value-{}", i)))
            .collect();
        let timestamp = chrono::Utc::now();

        group.bench_with_input(BenchmarkId::from_parameter(size), &existing, |b, existing| {
            b.iter(|| {
                annotate(
                    black_box(existing),
                    SyncStatus::Synced,
                    timestamp,
                    "backup",
                    &Metadata::new(),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_bucket_sync, bench_fingerprints, bench_annotate);
criterion_main!(benches);
