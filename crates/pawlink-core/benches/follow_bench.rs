//! # Follow Graph Benchmarks
//!
//! Run with: `cargo bench -p pawlink-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pawlink_core::{
    GraphService, MemoryEdgeStore, Page, ProjectionStrategy, UserId, export_snapshot,
};
use std::hint::black_box;

/// A hub followed by `size` users.
fn star(size: u64, strategy: ProjectionStrategy) -> GraphService<MemoryEdgeStore> {
    let svc = GraphService::new(MemoryEdgeStore::with_strategy(strategy));
    for i in 1..=size {
        svc.follow(&UserId(i), UserId(0)).expect("follow");
    }
    svc
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_follow_unfollow(c: &mut Criterion) {
    let mut group = c.benchmark_group("follow_unfollow");

    for size in [100u64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let svc = GraphService::new(MemoryEdgeStore::new());
                for i in 1..=size {
                    let _ = svc.follow(&UserId(i), UserId(0));
                }
                for i in 1..=size {
                    let _ = svc.unfollow(&UserId(i), UserId(0));
                }
                black_box(svc)
            });
        });
    }

    group.finish();
}

fn bench_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("follow_counts");

    for strategy in [ProjectionStrategy::Maintained, ProjectionStrategy::OnDemand] {
        for size in [1000u64, 10000].iter() {
            let svc = star(*size, strategy);
            group.bench_with_input(
                BenchmarkId::new(strategy.name(), size),
                size,
                |b, _| b.iter(|| black_box(svc.follow_counts(UserId(0)))),
            );
        }
    }

    group.finish();
}

fn bench_followers_page(c: &mut Criterion) {
    let svc = star(10000, ProjectionStrategy::Maintained);
    c.bench_function("followers_first_page", |b| {
        b.iter(|| black_box(svc.followers(UserId(0), Page::default())))
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let svc = star(10000, ProjectionStrategy::Maintained);
    c.bench_function("export_snapshot_10k", |b| {
        b.iter(|| black_box(export_snapshot(svc.store())))
    });
}

criterion_group!(
    benches,
    bench_follow_unfollow,
    bench_counts,
    bench_followers_page,
    bench_snapshot
);
criterion_main!(benches);
