//! Persistent list benchmarks
//!
//! These benchmarks measure push throughput against the memory pool and the
//! cost of rebuilding a list's cache from its on-disk chain.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use persistent_list::config::DEFAULT_BUCKET_SIZE;
use persistent_list::{MemoryPool, PersistentList};
use tempfile::tempdir;

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");

    for size in [16usize, 256, 4096] {
        let payload = vec![0xabu8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("push_back", size), &payload, |b, payload| {
            let dir = tempdir().unwrap();
            let pool = Arc::new(MemoryPool::open(dir.path(), "bench", DEFAULT_BUCKET_SIZE).unwrap());
            let list = PersistentList::create(&pool, "push_back").unwrap();

            b.iter(|| {
                let handle = list.push_back(black_box(payload)).unwrap();
                if list.len() >= 1024 {
                    list.clear().unwrap();
                }
                handle
            });
        });

        group.bench_with_input(BenchmarkId::new("push_front", size), &payload, |b, payload| {
            let dir = tempdir().unwrap();
            let pool = Arc::new(MemoryPool::open(dir.path(), "bench", DEFAULT_BUCKET_SIZE).unwrap());
            let list = PersistentList::create(&pool, "push_front").unwrap();

            b.iter(|| {
                let handle = list.push_front(black_box(payload)).unwrap();
                if list.len() >= 1024 {
                    list.clear().unwrap();
                }
                handle
            });
        });
    }

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for count in [100usize, 1000, 10000] {
        let dir = tempdir().unwrap();
        let pool = Arc::new(MemoryPool::open(dir.path(), "bench", DEFAULT_BUCKET_SIZE).unwrap());
        let list = PersistentList::create(&pool, "load").unwrap();
        for i in 0..count {
            list.push_back(format!("item-{}", i).as_bytes()).unwrap();
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| {
                list.load().unwrap();
                black_box(list.len())
            });
        });
    }

    group.finish();
}

fn bench_erase_front(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let pool = Arc::new(MemoryPool::open(dir.path(), "bench", DEFAULT_BUCKET_SIZE).unwrap());
    let list = PersistentList::create(&pool, "queue").unwrap();

    c.bench_function("queue_push_back_erase_front", |b| {
        b.iter(|| {
            list.push_back(black_box(b"message")).unwrap();
            list.erase(..1).unwrap()
        });
    });
}

criterion_group!(benches, bench_push, bench_load, bench_erase_front);
criterion_main!(benches);
