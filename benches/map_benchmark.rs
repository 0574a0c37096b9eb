//! Benchmarks for `ConcurrentMap`.
//!
//! Measures single-thread baseline throughput for `get`/`set`/`delete`, and
//! scaling under concurrent access from several threads.
//!
//! Run with: `cargo bench --bench map_benchmark`

#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cereggii::ConcurrentMap;

fn bench_single_thread_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("ConcurrentMap-SingleThread");

    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(1000));

        group.bench_with_input(BenchmarkId::new("set", size), &size, |b, &size| {
            let map = ConcurrentMap::<u64, u64>::new();
            let mut i = 0u64;
            b.iter(|| {
                map.set(&i, i);
                i = (i + 1) % (size as u64 * 2);
            });
        });

        group.bench_with_input(BenchmarkId::new("get_hit", size), &size, |b, &size| {
            let map = ConcurrentMap::<u64, u64>::new();
            for i in 0..size as u64 {
                map.set(&i, i);
            }
            let mut i = 0u64;
            b.iter(|| {
                let _ = black_box(map.get(&i));
                i = (i + 1) % (size as u64);
            });
        });

        group.bench_with_input(BenchmarkId::new("get_miss", size), &size, |b, &size| {
            let map = ConcurrentMap::<u64, u64>::new();
            for i in 0..size as u64 {
                map.set(&i, i);
            }
            let miss_key = size as u64 + 1_000_000;
            b.iter(|| {
                let _ = black_box(map.get(&miss_key));
            });
        });
    }

    group.finish();
}

fn bench_concurrent_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("ConcurrentMap-Concurrent");

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(10_000));

        group.bench_with_input(
            BenchmarkId::new("disjoint_inserts", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let map = ConcurrentMap::<u64, u64>::new();
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..(10_000 / threads as u64) {
                                    let key = t as u64 * 100_000 + i;
                                    map.set(&key, key);
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    black_box(map.approx_len());
                });
            },
        );
    }

    group.finish();
}

fn bench_fast_iter(c: &mut Criterion) {
    let mut group = c.benchmark_group("ConcurrentMap-FastIter");

    let map = ConcurrentMap::<u64, u64>::new();
    for i in 0..100_000u64 {
        map.set(&i, i);
    }

    group.bench_function("single_partition_full_scan", |b| {
        b.iter(|| {
            let count = map.fast_iter(1, 0).count();
            black_box(count);
        });
    });

    group.bench_function("four_partitions_full_scan", |b| {
        b.iter(|| {
            let total: usize = (0..4).map(|p| map.fast_iter(4, p).count()).sum();
            black_box(total);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_baseline,
    bench_concurrent_inserts,
    bench_fast_iter
);
criterion_main!(benches);
