//! # Stratos Convergence Benchmarks
//!
//! | Subsystem | Operation | Expectation |
//! |-----------|-----------|-------------|
//! | st-01 Resource Graph | Build and order a document | linear in resources + edges |
//! | st-02 Convergence | Full run against the in-memory cloud | dominated by provider calls |
//! | st-02 Convergence | Re-run against a converged cloud | observation only, no mutations |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use shared_types::{AttrRef, Cluster, ResourceDecl, ResourceKind};
use st_01_resource_graph::build_resource_graph;
use st_02_convergence::{InMemoryCloud, RunOutcome};
use st_tests::integration::fixtures::{chain_cluster, engine, web_cluster};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// One network, `n` subnets on it, declared in random order.
fn fan_cluster(n: usize) -> Cluster {
    let mut cluster = Cluster::new("bench", "proj-1", "local").with_resource(
        ResourceDecl::new("network/main", ResourceKind::Network).with_attr("cidr", "10.0.0.0/8"),
    );
    for i in 0..n {
        cluster.resources.push(
            ResourceDecl::new(format!("subnet/s{}", i), ResourceKind::Subnet)
                .with_attr("network", AttrRef::id("network/main"))
                .with_attr("cidr", format!("10.{}.{}.0/24", i / 256, i % 256)),
        );
    }
    cluster.resources.shuffle(&mut rand::thread_rng());
    cluster
}

// ============================================================================
// ST-01: Graph construction
// ============================================================================

fn bench_build_resource_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("st-01-resource-graph");

    for size in [10, 100, 1_000] {
        let chain = chain_cluster("bench", size);
        let fan = fan_cluster(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("chain", size), &chain, |b, cluster| {
            b.iter(|| black_box(build_resource_graph(cluster).is_ok()))
        });
        group.bench_with_input(BenchmarkId::new("fan", size), &fan, |b, cluster| {
            b.iter(|| black_box(build_resource_graph(cluster).is_ok()))
        });
    }

    group.finish();
}

// ============================================================================
// ST-02: Convergence runs
// ============================================================================

fn bench_converge(c: &mut Criterion) {
    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => panic!("tokio runtime: {}", e),
    };
    let mut group = c.benchmark_group("st-02-convergence");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("fresh_cloud_web_cluster", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cloud = Arc::new(InMemoryCloud::new());
                let outcome = engine(&cloud, web_cluster("bench")).run(false).await;
                black_box(matches!(outcome, Ok(RunOutcome::Converged(_))))
            })
        })
    });

    for size in [10, 100] {
        let cloud = Arc::new(InMemoryCloud::new());
        let converged = rt.block_on(async {
            match engine(&cloud, fan_cluster(size)).run(false).await {
                Ok(RunOutcome::Converged(report)) => report.cluster,
                other => panic!("setup run did not converge: {:?}", other),
            }
        });

        group.throughput(Throughput::Elements(size as u64 + 1));
        group.bench_with_input(BenchmarkId::new("noop_rerun_fan", size), &converged, |b, cluster| {
            b.iter(|| {
                rt.block_on(async {
                    let outcome = engine(&cloud, cluster.clone()).run(false).await;
                    black_box(matches!(outcome, Ok(RunOutcome::Converged(_))))
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_resource_graph, bench_converge);
criterion_main!(benches);
