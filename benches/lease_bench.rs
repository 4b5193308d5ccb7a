//! Benchmarks for the lease pool and timer scheduler.
//!
//! Benchmarks cover:
//! - Lease/recycle round trips on a warm pool
//! - Growth from an empty pool up to `max_threads`
//! - `execute` throughput through leased workers
//! - Timer queue insertion and purge through the scheduler

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prometheus_lease_pool::config::{SchedulerConfig, WorkerPoolConfig};
use prometheus_lease_pool::core::{Scheduler, Task, WorkerPool};

// ============================================================================
// Helper Functions
// ============================================================================

fn bench_pool(max: usize, min_spare: usize, inc: usize) -> WorkerPool {
    WorkerPool::new(
        WorkerPoolConfig::new()
            .with_name("bench")
            .with_max_threads(max)
            .with_min_spare_threads(min_spare)
            .with_max_spare_threads(max)
            .with_inc_threads(inc)
            .with_monitor_period_ms(3_600_000),
    )
    .expect("bench pool")
}

// ============================================================================
// Pool Benchmarks
// ============================================================================

fn bench_lease_recycle(c: &mut Criterion) {
    let pool = bench_pool(8, 8, 1);
    c.bench_function("lease_recycle_warm", |b| {
        b.iter(|| {
            let worker = pool.lease(Some(Duration::ZERO)).expect("idle worker");
            black_box(worker.name().len());
            pool.recycle(worker);
        });
    });
    pool.stop();
}

fn bench_grow_to_max(c: &mut Criterion) {
    let mut group = c.benchmark_group("grow_to_max");
    group.sample_size(20);

    for max in [4_usize, 16, 64] {
        group.throughput(Throughput::Elements(max as u64));
        group.bench_with_input(BenchmarkId::from_parameter(max), &max, |b, &max| {
            b.iter(|| {
                let pool = bench_pool(max, 0, 4);
                let held: Vec<_> = (0..max)
                    .map(|_| pool.lease(Some(Duration::ZERO)).expect("growth"))
                    .collect();
                black_box(held.len());
                drop(held);
                pool.stop();
            });
        });
    }
    group.finish();
}

fn bench_execute_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_throughput");

    for tasks in [100_u64, 1_000] {
        group.throughput(Throughput::Elements(tasks));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            let pool = bench_pool(8, 8, 1);
            b.iter(|| {
                let done = Arc::new(AtomicU64::new(0));
                for _ in 0..tasks {
                    let done = Arc::clone(&done);
                    pool.execute(Task::from_fn(move || {
                        done.fetch_add(1, Ordering::Relaxed);
                    }))
                    .expect("execute");
                }
                while done.load(Ordering::Relaxed) < tasks {
                    std::hint::spin_loop();
                }
            });
            pool.stop();
        });
    }
    group.finish();
}

// ============================================================================
// Scheduler Benchmarks
// ============================================================================

fn bench_schedule_and_purge(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_and_purge");
    let scheduler = Scheduler::new(SchedulerConfig::new().with_name("bench")).expect("scheduler");

    for size in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let handle = scheduler
                        .schedule_once(|| Ok(()), Duration::from_secs(3600 + i))
                        .expect("schedule");
                    handle.cancel();
                }
                black_box(scheduler.purge());
            });
        });
    }
    group.finish();
    scheduler.stop();
}

criterion_group!(pool_benches, bench_lease_recycle, bench_grow_to_max, bench_execute_throughput);
criterion_group!(scheduler_benches, bench_schedule_and_purge);
criterion_main!(pool_benches, scheduler_benches);
