//! Benchmarks exercising the public `SlabMulti<T>` facade only: single
//! alloc/dealloc, batch alloc-then-free, and a multi-threaded churn
//! pattern with cross-thread frees.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use slab_multi::SlabMulti;
use std::hint::black_box;

fn bench_single_alloc_dealloc(c: &mut Criterion) {
    let alloc: SlabMulti<u8> = SlabMulti::new();
    let sizes: &[usize] = &[8, 64, 256, 1024, 4096, 65536];
    let mut group = c.benchmark_group("single_alloc_dealloc");

    for &size in sizes {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("slab_multi", size), &size, |b, &size| {
            b.iter(|| {
                let ptr = alloc.allocate(black_box(size)).unwrap();
                alloc.deallocate(ptr, size);
            })
        });
    }
    group.finish();
}

fn bench_batch_alloc_free(c: &mut Criterion) {
    let alloc: SlabMulti<u8> = SlabMulti::new();
    let sizes: &[usize] = &[8, 64, 512, 4096];
    let n = 1000usize;
    let mut group = c.benchmark_group("batch_1000_alloc_then_free");

    for &size in sizes {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("slab_multi", size), &size, |b, &size| {
            b.iter(|| {
                let mut ptrs = Vec::with_capacity(n);
                for _ in 0..n {
                    ptrs.push(alloc.allocate(size).unwrap());
                }
                for ptr in ptrs.into_iter().rev() {
                    alloc.deallocate(ptr, size);
                }
            })
        });
    }
    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let alloc: SlabMulti<u8> = SlabMulti::new();
    let sizes: &[usize] = &[32, 256, 2048];
    let rounds = 200;
    let mut group = c.benchmark_group("churn_200_rounds");

    for &size in sizes {
        group.throughput(Throughput::Elements(rounds as u64 * 10));
        group.bench_with_input(BenchmarkId::new("slab_multi", size), &size, |b, &size| {
            b.iter(|| {
                let mut live = Vec::new();
                for _ in 0..rounds {
                    for _ in 0..10 {
                        live.push(alloc.allocate(size).unwrap());
                    }
                    let drain = live.len() / 2;
                    for _ in 0..drain {
                        let ptr = live.pop().unwrap();
                        alloc.deallocate(ptr, size);
                    }
                }
                for ptr in live {
                    alloc.deallocate(ptr, size);
                }
            })
        });
    }
    group.finish();
}

fn bench_multithreaded_cross_free(c: &mut Criterion) {
    let alloc: SlabMulti<u8> = SlabMulti::new();
    let nthreads = 4;
    let ops_per_thread = 5000usize;

    let mut group = c.benchmark_group("multithreaded_4_threads_cross_free");
    group.throughput(Throughput::Elements((ops_per_thread * nthreads) as u64));

    group.bench_function("slab_multi", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..nthreads)
                .map(|_| {
                    std::thread::spawn(move || {
                        let mut ptrs = Vec::with_capacity(100);
                        for _ in 0..ops_per_thread {
                            ptrs.push(alloc.allocate(64).unwrap());
                            if ptrs.len() > 50 {
                                for _ in 0..25 {
                                    let ptr = ptrs.pop().unwrap();
                                    alloc.deallocate(ptr, 64);
                                }
                            }
                        }
                        for ptr in ptrs {
                            alloc.deallocate(ptr, 64);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_alloc_dealloc,
    bench_batch_alloc_free,
    bench_churn,
    bench_multithreaded_cross_free,
);
criterion_main!(benches);
