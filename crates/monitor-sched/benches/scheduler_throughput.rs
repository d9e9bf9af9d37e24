//! Task submission and drain throughput for the work-stealing scheduler.
//!
//! Run with: cargo bench --package monitor-sched

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use monitor_sched::{Scheduler, SchedulingPolicy};

fn bench_submit_single(c: &mut Criterion) {
    let scheduler = Scheduler::new();
    scheduler.initialize(4).unwrap();
    scheduler.start().unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    let mut group = c.benchmark_group("submit");
    group.throughput(Throughput::Elements(1));
    group.bench_function("single_task", |b| {
        b.iter(|| {
            let done = done.clone();
            black_box(
                scheduler
                    .submit(0, Box::new(move || {
                        done.fetch_add(1, Ordering::Relaxed);
                    }))
                    .unwrap(),
            );
        });
    });
    group.finish();

    scheduler.shutdown();
}

fn bench_submit_with_stealing(c: &mut Criterion) {
    let scheduler = Scheduler::new();
    scheduler.initialize(8).unwrap();
    scheduler.set_scheduling_policy(SchedulingPolicy::WorkStealing);
    scheduler.start().unwrap();

    let mut group = c.benchmark_group("submit_batch");
    group.throughput(Throughput::Elements(100));
    group.bench_function("100_tasks_work_stealing", |b| {
        b.iter(|| {
            let batch = (0..100)
                .map(|i| (i % 4, Box::new(|| {}) as monitor_sched::TaskFn))
                .collect();
            let results = scheduler.submit_many(black_box(batch));
            black_box(results);
        });
    });
    group.finish();

    std::thread::sleep(Duration::from_millis(50));
    scheduler.shutdown();
}

criterion_group!(benches, bench_submit_single, bench_submit_with_stealing);
criterion_main!(benches);
