use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowstat::command::ProxyStatusCommand;
use flowstat::core::{AggregationPolicy, BackendTarget, ConnectionRecord, FlowRegistry};
use flowstat::report::{CallerIdentity, FlowReporter, RoleElevationPolicy, RoleName, Verbosity};
use serde_json::json;
use std::sync::Arc;

fn reporter(count: usize) -> FlowReporter {
    let registry = Arc::new(FlowRegistry::new(AggregationPolicy::PerTarget));
    for i in 0..count {
        let id = registry.next_connection_id();
        let target = BackendTarget::shard(format!("shard{}:27018", i % 8));
        registry.register(ConnectionRecord::new(id, target)).unwrap();
    }
    FlowReporter::new(registry)
}

/// Reporter query across tiers and privileges
fn bench_query(c: &mut Criterion) {
    let reporter = reporter(1000);
    let mut group = c.benchmark_group("reporter_query");

    for tier in Verbosity::ALL_TIERS {
        for elevated in [false, true] {
            let name = if elevated { "elevated" } else { "standard" };
            group.bench_with_input(BenchmarkId::new(name, tier), &tier, |b, &tier| {
                b.iter(|| black_box(reporter.query(tier, elevated)));
            });
        }
    }

    group.finish();
}

/// Full command path including envelope rendering
fn bench_command(c: &mut Criterion) {
    let command = ProxyStatusCommand::new(reporter(1000), Arc::new(RoleElevationPolicy::default()));
    let root = CallerIdentity::authenticated("admin", vec![RoleName::new("root", "admin")]);
    let request = json!({ "proxyStatus": 1, "dumpConnType": "all" });

    c.bench_function("proxy_status_all_elevated", |b| {
        b.iter(|| black_box(command.run(&root, &request).unwrap()));
    });
}

criterion_group!(benches, bench_query, bench_command);
criterion_main!(benches);
