use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowstat::core::{
    AggregationPolicy, BackendTarget, ConnectionRecord, ConnectionState, FlowRegistry,
    RecordMutation,
};

/// Registry pre-populated with `count` live connections spread over four shards
fn populated_registry(count: usize) -> FlowRegistry {
    let registry = FlowRegistry::new(AggregationPolicy::PerTarget);
    for i in 0..count {
        let id = registry.next_connection_id();
        let target = BackendTarget::shard(format!("shard{}:27018", i % 4));
        registry.register(ConnectionRecord::new(id, target)).unwrap();
    }
    registry
}

/// register / update / unregister cycle for one connection
fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lifecycle");

    for live in [0usize, 1000, 10000].iter() {
        let registry = populated_registry(*live);
        let target = BackendTarget::shard("shard0:27018");

        group.bench_with_input(BenchmarkId::new("open_use_close", live), live, |b, _| {
            b.iter(|| {
                let id = registry.next_connection_id();
                registry
                    .register(ConnectionRecord::new(id, target.clone()))
                    .unwrap();
                registry.update(
                    id,
                    RecordMutation::traffic(512, 2048, 1).with_state(ConnectionState::InUse),
                );
                black_box(registry.unregister(id));
            });
        });
    }

    group.finish();
}

/// Snapshot cost by tier and registry size
fn bench_snapshots(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_snapshot");

    for live in [100usize, 1000, 10000].iter() {
        let registry = populated_registry(*live);

        group.bench_with_input(BenchmarkId::new("aggregated_only", live), live, |b, _| {
            b.iter(|| black_box(registry.snapshot_aggregated_only().unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("all", live), live, |b, _| {
            b.iter(|| black_box(registry.snapshot_all().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lifecycle, bench_snapshots);
criterion_main!(benches);
