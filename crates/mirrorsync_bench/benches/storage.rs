//! Key-value store and persistence benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mirrorsync_bench::{encode_collection, generate_records, random_data};
use mirrorsync_engine::PersistenceAdapter;
use mirrorsync_protocol::EntityRecord;
use mirrorsync_storage::{FileStore, InMemoryStore, KeyValueStore};
use std::sync::Arc;
use tempfile::TempDir;

/// Benchmark InMemoryStore put operations.
fn bench_inmemory_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_put");

    for size in [256, 4096, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let store = InMemoryStore::new();
            let data = random_data(size);

            b.iter(|| {
                store.put(black_box("bench:v1:assets"), black_box(&data)).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark FileStore put operations (temp file, sync, rename).
fn bench_file_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_put");
    group.sample_size(20);

    for size in [256, 4096, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let store = FileStore::open(temp_dir.path()).unwrap();
            let data = random_data(size);

            b.iter(|| {
                store.put(black_box("bench:v1:assets"), black_box(&data)).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark FileStore reads.
fn bench_file_get(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path()).unwrap();
    store
        .put("bench:v1:assets", &encode_collection(&generate_records(1000, 1000)))
        .unwrap();

    c.bench_function("file_get_1000_records", |b| {
        b.iter(|| black_box(store.get(black_box("bench:v1:assets")).unwrap()));
    });
}

/// Benchmark a full collection save and load through the adapter.
fn bench_persistence_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("persistence_round_trip");

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let adapter = PersistenceAdapter::new(Arc::new(InMemoryStore::new()));
            let records = generate_records(count, count);

            b.iter(|| {
                adapter.save("bench:v1:assets", Some(records.as_slice()));
                let loaded: Vec<EntityRecord> = adapter.load("bench:v1:assets", Vec::new());
                black_box(loaded);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_inmemory_put,
    bench_file_put,
    bench_file_get,
    bench_persistence_round_trip
);
criterion_main!(benches);
