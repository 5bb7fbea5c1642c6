//! Shared documents, leases and journal helpers.

use shared_types::{AttrRef, AttrValue, Attributes, Cluster, ResourceDecl, ResourceKey, ResourceKind};
use st_02_convergence::adapters::cloud::{CloudOp, JournalEntry};
use st_02_convergence::adapters::resources::provider_name;
use st_02_convergence::{
    ConvergenceEngine, ConvergenceReport, EngineConfig, InMemoryCloud, RunLease, RunOutcome,
};
use std::sync::Arc;

/// Lease that is always held; the state store is not under test here.
pub struct StaticLease(pub String);

impl RunLease for StaticLease {
    fn cluster_name(&self) -> &str {
        &self.0
    }

    fn is_held(&self) -> bool {
        true
    }
}

pub fn rule(protocol: &str, ports: &[i64]) -> AttrValue {
    let mut rule = Attributes::new();
    rule.insert("protocol".into(), protocol.into());
    if !ports.is_empty() {
        rule.insert(
            "ports".into(),
            AttrValue::List(ports.iter().map(|p| AttrValue::Int(*p)).collect()),
        );
    }
    AttrValue::Map(rule)
}

fn pool(name: &str, subnet: &str, role: &str, size: AttrValue) -> ResourceDecl {
    ResourceDecl::new(format!("compute_pool/{}", name), ResourceKind::ComputePool)
        .with_attr("subnet", AttrRef::id(format!("subnet/{}", subnet)))
        .with_attr("role", role)
        .with_attr("image", "ubuntu-22.04")
        .with_attr("machine_type", "n1-standard-2")
        .with_attr("size", size)
}

fn balancer(name: &str, subnet: &str, pool: &str, listeners: &[i64]) -> ResourceDecl {
    ResourceDecl::new(format!("load_balancer/{}", name), ResourceKind::LoadBalancer)
        .with_attr("subnet", AttrRef::id(format!("subnet/{}", subnet)))
        .with_attr(
            "listeners",
            AttrValue::List(listeners.iter().map(|p| AttrValue::Int(*p)).collect()),
        )
        .with_attr(
            "targets",
            AttrRef::new(format!("compute_pool/{}", pool), "instance_group"),
        )
}

/// Two-tier cluster with eight resources. Each load balancer depends on
/// its subnet and on the pool it targets.
///
/// ```text
/// network/main ─┬─ subnet/masters ── compute_pool/masters ── load_balancer/api
///               ├─ subnet/workers ── compute_pool/workers ── load_balancer/ingress
///               └─ firewall/internal
/// ```
pub fn web_cluster(name: &str) -> Cluster {
    let mut autoscale = Attributes::new();
    autoscale.insert("min".into(), AttrValue::Int(2));
    autoscale.insert("max".into(), AttrValue::Int(5));

    Cluster::new(name, "proj-1", "local")
        .with_resource(
            ResourceDecl::new("network/main", ResourceKind::Network).with_attr("cidr", "10.0.0.0/16"),
        )
        .with_resource(
            ResourceDecl::new("subnet/masters", ResourceKind::Subnet)
                .with_attr("network", AttrRef::id("network/main"))
                .with_attr("cidr", "10.0.1.0/24"),
        )
        .with_resource(
            ResourceDecl::new("subnet/workers", ResourceKind::Subnet)
                .with_attr("network", AttrRef::id("network/main"))
                .with_attr("cidr", "10.0.2.0/24"),
        )
        .with_resource(
            ResourceDecl::new("firewall/internal", ResourceKind::Firewall)
                .with_attr("network", AttrRef::id("network/main"))
                .with_attr(
                    "rules",
                    AttrValue::List(vec![rule("tcp", &[22, 6443]), rule("icmp", &[])]),
                ),
        )
        .with_resource(pool("masters", "masters", "master", AttrValue::Int(1)))
        .with_resource(pool("workers", "workers", "node", AttrValue::Map(autoscale)))
        .with_resource(balancer("api", "masters", "masters", &[6443]))
        .with_resource(balancer("ingress", "workers", "workers", &[80, 443]))
}

/// `n` networks, each explicitly depending on the previous one.
pub fn chain_cluster(name: &str, n: usize) -> Cluster {
    let mut cluster = Cluster::new(name, "proj-1", "local");
    for i in 0..n {
        let mut decl = ResourceDecl::new(format!("network/n{}", i), ResourceKind::Network)
            .with_attr("cidr", format!("10.{}.0.0/16", i % 256));
        if i > 0 {
            decl = decl.with_dependency(format!("network/n{}", i - 1));
        }
        cluster.resources.push(decl);
    }
    cluster
}

pub fn engine_with(cloud: &Arc<InMemoryCloud>, cluster: Cluster, config: EngineConfig) -> ConvergenceEngine {
    let lease = Arc::new(StaticLease(cluster.name.clone()));
    ConvergenceEngine::new(config, cloud.clone(), cluster, lease)
}

pub fn engine(cloud: &Arc<InMemoryCloud>, cluster: Cluster) -> ConvergenceEngine {
    engine_with(cloud, cluster, EngineConfig::default())
}

/// Run to convergence, panicking on anything else.
pub async fn converge(cloud: &Arc<InMemoryCloud>, cluster: Cluster) -> ConvergenceReport {
    match engine(cloud, cluster).run(false).await {
        Ok(RunOutcome::Converged(report)) => report,
        Ok(other) => panic!("expected convergence, got {:?}", other),
        Err(e) => panic!("expected convergence, got error: {}", e),
    }
}

/// The successful `op` call on the object `key` names.
pub fn journal_entry(
    journal: &[JournalEntry],
    op: CloudOp,
    cluster: &Cluster,
    key: &ResourceKey,
) -> Option<JournalEntry> {
    let kind = cluster.get(key)?.kind;
    let name = provider_name(cluster, key);
    journal
        .iter()
        .find(|e| e.ok && e.op == op && e.kind == Some(kind) && e.target == name)
        .cloned()
}

/// Whether any two successful `op` calls were in flight at the same time.
pub fn overlapping(journal: &[JournalEntry], op: CloudOp) -> bool {
    let calls: Vec<&JournalEntry> = journal.iter().filter(|e| e.ok && e.op == op).collect();
    calls.iter().enumerate().any(|(i, a)| {
        calls[i + 1..]
            .iter()
            .any(|b| a.begin < b.end && b.begin < a.end)
    })
}
