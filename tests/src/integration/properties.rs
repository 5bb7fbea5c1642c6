//! # Convergence Properties
//!
//! End-to-end checks of the engine against the in-memory cloud:
//!
//! 1. **Idempotence**: a second run against a converged cloud mutates nothing
//! 2. **Convergence**: every provider object carries its declared attributes
//! 3. **Dependency ordering**: a dependency's apply finishes before a dependent starts
//! 4. **Deletion ordering**: a dependent is deleted before what it depends on
//! 5. **Cycle rejection**: cycles are named before any provider call
//! 6. **Resumption**: a re-run after a partial failure finishes the job
//! 7. **Tag completeness**: every managed object carries the ownership tags

#[cfg(test)]
mod tests {
    use super::super::fixtures::{
        converge, engine, engine_with, journal_entry, overlapping, web_cluster, StaticLease,
    };
    use shared_types::{Cluster, ResourceDecl, ResourceKey, ResourceKind};
    use st_01_resource_graph::{build_resource_graph, GraphError};
    use st_02_convergence::adapters::cloud::{CloudOp, Fault};
    use st_02_convergence::algorithms::tags::{TAG_CLUSTER, TAG_MANAGED_BY, TAG_RESOURCE};
    use st_02_convergence::{
        ConvergenceEngine, EngineConfig, InMemoryCloud, Operation, ProviderError, ReconcileError,
        Reconciler, ResourceError, RetryPolicy, RunOutcome, StructuralError, TagConfig,
        TagPropagator,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    fn keys(raw: &[&str]) -> Vec<ResourceKey> {
        raw.iter().map(|k| ResourceKey::from(*k)).collect()
    }

    fn slow_cloud() -> Arc<InMemoryCloud> {
        Arc::new(InMemoryCloud::new().with_latency(Duration::from_millis(5)))
    }

    // =========================================================================
    // IDEMPOTENCE AND CONVERGENCE
    // =========================================================================

    #[tokio::test]
    async fn test_rerun_is_a_noop() {
        let cloud = Arc::new(InMemoryCloud::new());
        let first = converge(&cloud, web_cluster("alpha")).await;
        assert_eq!(first.created.len(), 8);
        cloud.clear_journal();

        let second = converge(&cloud, first.cluster.clone()).await;

        assert!(second.is_noop());
        assert_eq!(second.unchanged.len(), 8);
        assert!(cloud.mutations().is_empty(), "{:?}", cloud.mutations());
        assert_eq!(second.cluster, first.cluster);
    }

    #[tokio::test]
    async fn test_objects_match_declarations() {
        let cloud = Arc::new(InMemoryCloud::new());
        let report = converge(&cloud, web_cluster("alpha")).await;
        let document = &report.cluster;

        for decl in &document.resources {
            let id = decl.provider_id().expect("rendered");
            let object = cloud
                .objects()
                .into_iter()
                .find(|o| o.id == id)
                .expect("object exists");
            assert_eq!(object.kind, decl.kind);
            for (name, value) in &decl.attributes {
                let resolved = document.resolve(value).unwrap();
                assert_eq!(object.attributes.get(name), Some(&resolved), "{} {}", decl.key, name);
            }
        }

        // A fresh plan against the converged cloud has nothing to do
        let mut check = engine(&cloud, report.cluster.clone());
        check.init().await.unwrap();
        check.get_actual().await.unwrap();
        check.get_expected().await.unwrap();
        assert!(check.changes().unwrap().is_converged());
    }

    // =========================================================================
    // ORDERING
    // =========================================================================

    #[tokio::test]
    async fn test_dependencies_applied_first() {
        let cloud = slow_cloud();
        let cluster = web_cluster("alpha");
        let graph = build_resource_graph(&cluster).unwrap();

        converge(&cloud, cluster.clone()).await;
        let journal = cloud.journal();

        for decl in &cluster.resources {
            let dependent = journal_entry(&journal, CloudOp::Create, &cluster, &decl.key).unwrap();
            for dependency in graph.dependencies(&decl.key) {
                let created = journal_entry(&journal, CloudOp::Create, &cluster, dependency).unwrap();
                let tagged = journal_entry(&journal, CloudOp::SetTags, &cluster, dependency).unwrap();
                assert!(created.end < dependent.begin, "{} before {}", dependency, decl.key);
                assert!(tagged.end < dependent.begin, "{} tagged before {}", dependency, decl.key);
            }
        }

        // Independent subtrees ran side by side
        assert!(overlapping(&journal, CloudOp::Create));
    }

    #[tokio::test]
    async fn test_single_worker_follows_topological_order() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = web_cluster("alpha");
        let order = build_resource_graph(&cluster).unwrap().order().to_vec();
        let config = EngineConfig {
            max_workers: 1,
            ..EngineConfig::default()
        };

        let report = match engine_with(&cloud, cluster, config).run(false).await {
            Ok(RunOutcome::Converged(report)) => report,
            other => panic!("expected convergence, got {:?}", other),
        };

        assert_eq!(report.created, order);
        assert!(!overlapping(&cloud.journal(), CloudOp::Create));
    }

    #[tokio::test]
    async fn test_destroy_deletes_dependents_first() {
        let cloud = slow_cloud();
        let cluster = converge(&cloud, web_cluster("alpha")).await.cluster;
        let graph = build_resource_graph(&cluster).unwrap();
        cloud.clear_journal();

        let report = match engine(&cloud, cluster.clone()).run(true).await {
            Ok(RunOutcome::Destroyed(report)) => report,
            other => panic!("expected destroy, got {:?}", other),
        };
        assert_eq!(report.deleted.len(), 8);
        assert!(cloud.objects().is_empty());

        let journal = cloud.journal();
        for decl in &cluster.resources {
            let dependency_deleted = journal_entry(&journal, CloudOp::Delete, &cluster, &decl.key).unwrap();
            for dependent in graph.dependents(&decl.key) {
                let deleted = journal_entry(&journal, CloudOp::Delete, &cluster, dependent).unwrap();
                assert!(deleted.end < dependency_deleted.begin, "{} before {}", dependent, decl.key);
            }
        }
    }

    #[tokio::test]
    async fn test_deletes_wait_for_every_apply() {
        let cloud = slow_cloud();
        let mut cluster = converge(&cloud, web_cluster("alpha")).await.cluster;
        cluster
            .get_mut(&"load_balancer/api".into())
            .unwrap()
            .ensure = shared_types::Ensure::Absent;
        cluster
            .get_mut(&"compute_pool/workers".into())
            .unwrap()
            .attributes
            .insert("machine_type".into(), "n1-standard-4".into());
        cloud.clear_journal();

        let report = converge(&cloud, cluster).await;

        assert_eq!(report.deleted, keys(&["load_balancer/api"]));
        assert_eq!(report.updated, keys(&["compute_pool/workers"]));
        let journal = cloud.journal();
        let delete = journal.iter().find(|e| e.op == CloudOp::Delete).unwrap();
        assert!(journal
            .iter()
            .filter(|e| e.op == CloudOp::Update || e.op == CloudOp::SetTags)
            .all(|e| e.end < delete.begin));
    }

    #[tokio::test]
    async fn test_absent_chain_deleted_dependents_first() {
        let cloud = slow_cloud();
        let mut cluster = converge(&cloud, web_cluster("alpha")).await.cluster;
        for key in ["subnet/masters", "compute_pool/masters", "load_balancer/api"] {
            cluster.get_mut(&key.into()).unwrap().ensure = shared_types::Ensure::Absent;
        }
        cloud.clear_journal();

        let report = converge(&cloud, cluster.clone()).await;

        let mut deleted = report.deleted.clone();
        deleted.sort();
        assert_eq!(
            deleted,
            keys(&["compute_pool/masters", "load_balancer/api", "subnet/masters"])
        );
        assert!(report.created.is_empty() && report.updated.is_empty());
        assert_eq!(cloud.objects().len(), 5);

        let journal = cloud.journal();
        let delete = |key: &str| journal_entry(&journal, CloudOp::Delete, &cluster, &key.into()).unwrap();
        let (lb, pool, subnet) = (
            delete("load_balancer/api"),
            delete("compute_pool/masters"),
            delete("subnet/masters"),
        );
        assert!(lb.end < pool.begin, "pool deleted while its balancer existed");
        assert!(pool.end < subnet.begin, "subnet deleted while its pool existed");

        // Deleted resources lose their rendered outputs
        for key in ["subnet/masters", "compute_pool/masters", "load_balancer/api"] {
            assert!(report.cluster.get(&key.into()).unwrap().provider_id().is_none());
        }
    }

    // =========================================================================
    // CYCLES
    // =========================================================================

    #[tokio::test]
    async fn test_cycle_named_before_any_provider_call() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = web_cluster("alpha")
            .with_resource(
                ResourceDecl::new("network/r1", ResourceKind::Network)
                    .with_attr("cidr", "10.1.0.0/16")
                    .with_dependency("network/r2"),
            )
            .with_resource(
                ResourceDecl::new("network/r2", ResourceKind::Network)
                    .with_attr("cidr", "10.2.0.0/16")
                    .with_dependency("network/r1"),
            );

        let err = engine(&cloud, cluster).run(false).await.unwrap_err();

        let ReconcileError::Structural(StructuralError::Graph(GraphError::CycleDetected { mut members })) = err
        else {
            panic!("expected a cycle");
        };
        members.sort();
        assert_eq!(members, keys(&["network/r1", "network/r2"]));
        assert!(cloud.journal().is_empty());
    }

    // =========================================================================
    // PARTIAL FAILURE AND RESUMPTION
    // =========================================================================

    #[tokio::test]
    async fn test_failure_halts_only_its_subtree() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.inject(Fault::permission_denied(CloudOp::Create, "alpha-workers"));

        // subnet/workers and compute_pool/workers share the provider name;
        // only the subnet is created before the pool is dispatched
        let err = engine(&cloud, web_cluster("alpha")).run(false).await.unwrap_err();
        let ReconcileError::PartialConvergence { failed, skipped, cluster } = err else {
            panic!("expected partial convergence");
        };

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key.as_str(), "subnet/workers");
        assert_eq!(failed[0].operation, Operation::Apply);
        assert!(failed[0].error.is_permission_denied());
        assert_eq!(
            skipped,
            keys(&["compute_pool/workers", "load_balancer/ingress"])
        );

        // The other subtree converged and is recorded
        for key in ["network/main", "subnet/masters", "firewall/internal", "compute_pool/masters", "load_balancer/api"] {
            assert!(cluster.get(&key.into()).unwrap().provider_id().is_some(), "{}", key);
        }
        assert_eq!(cloud.objects().len(), 5);

        cloud.clear_faults();
        let report = converge(&cloud, *cluster).await;
        assert_eq!(
            report.created,
            keys(&["subnet/workers", "compute_pool/workers", "load_balancer/ingress"])
        );
        assert_eq!(report.unchanged.len(), 5);
        assert_eq!(cloud.objects().len(), 8);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_node() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.inject(Fault::transient(CloudOp::Create, "alpha-internal", 10));
        let config = EngineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 2.0,
            },
            ..EngineConfig::default()
        };

        let err = engine_with(&cloud, web_cluster("alpha"), config)
            .run(false)
            .await
            .unwrap_err();
        let ReconcileError::PartialConvergence { failed, skipped, .. } = err else {
            panic!("expected partial convergence");
        };

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key.as_str(), "firewall/internal");
        assert!(matches!(
            &failed[0].error,
            ResourceError::Provider(ProviderError::RetriesExhausted { attempts: 3, .. })
        ));
        assert!(skipped.is_empty());
        let attempts = cloud
            .journal()
            .iter()
            .filter(|e| e.op == CloudOp::Create && e.target == "alpha-internal")
            .count();
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_drains_and_resumes() {
        let cloud = Arc::new(InMemoryCloud::new().with_latency(Duration::from_millis(20)));
        let (tx, rx) = watch::channel(false);
        let mut engine = engine(&cloud, web_cluster("alpha")).with_cancellation(rx);

        // Interrupt as soon as the network exists, while it is being tagged
        let interrupt = async {
            while !cloud.journal().iter().any(|e| e.op == CloudOp::Create && e.ok) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(engine.run(false), interrupt);

        let err = result.unwrap_err();
        let ReconcileError::Interrupted { pending, cluster } = err else {
            panic!("expected an interrupt");
        };
        assert_eq!(pending.len(), 7);
        assert!(!pending.contains(&"network/main".into()));
        assert!(cluster.get(&"network/main".into()).unwrap().provider_id().is_some());
        assert_eq!(cloud.objects().len(), 1);

        let report = converge(&cloud, *cluster).await;
        assert_eq!(report.created.len(), 7);
        assert_eq!(report.unchanged, keys(&["network/main"]));
    }

    // =========================================================================
    // TAGS
    // =========================================================================

    #[tokio::test]
    async fn test_every_object_carries_ownership_tags() {
        let cloud = Arc::new(InMemoryCloud::new());
        let config = EngineConfig {
            tags: TagConfig {
                extra: BTreeMap::from([("team".to_string(), "platform".to_string())]),
            },
            ..EngineConfig::default()
        };
        let cluster = web_cluster("alpha");
        let propagator = TagPropagator::new(&config.tags, &cluster).unwrap();

        match engine_with(&cloud, cluster.clone(), config).run(false).await {
            Ok(RunOutcome::Converged(_)) => {}
            other => panic!("expected convergence, got {:?}", other),
        }

        let objects = cloud.objects();
        assert_eq!(objects.len(), 8);
        for object in objects {
            let key = object.tags.get(TAG_RESOURCE).expect("resource tag");
            let decl = cluster.get(&key.into()).unwrap();
            let expected = propagator.for_resource(&decl.key, &decl.attributes).unwrap();
            assert!(object.tags.contains_all(&expected), "{}", key);
            assert_eq!(object.tags.get(TAG_CLUSTER), Some("alpha"));
            assert_eq!(object.tags.get(TAG_MANAGED_BY), Some("stratos"));
            assert_eq!(object.tags.get("team"), Some("platform"));
        }
    }

    #[tokio::test]
    async fn test_colliding_provider_name_of_other_cluster_left_alone() {
        let cloud = Arc::new(InMemoryCloud::new());
        // Both declarations map to the provider name "prod-eu-net"
        let prod_eu = Cluster::new("prod-eu", "proj-1", "local").with_resource(
            ResourceDecl::new("network/net", ResourceKind::Network).with_attr("cidr", "10.0.0.0/16"),
        );
        let prod = Cluster::new("prod", "proj-1", "local").with_resource(
            ResourceDecl::new("network/eu-net", ResourceKind::Network).with_attr("cidr", "10.1.0.0/16"),
        );
        converge(&cloud, prod_eu).await;
        cloud.clear_journal();

        for teardown in [true, false] {
            let err = engine(&cloud, prod.clone()).run(teardown).await.unwrap_err();
            let ReconcileError::Observe { key, source } = err else {
                panic!("expected an observation failure");
            };
            assert_eq!(key.as_str(), "network/eu-net");
            assert!(matches!(
                source,
                ResourceError::Structural(StructuralError::ForeignObject { .. })
            ));
        }

        assert!(cloud.mutations().is_empty(), "{:?}", cloud.mutations());
        let survivor = cloud.object(ResourceKind::Network, "prod-eu-net").unwrap();
        assert_eq!(survivor.tags.get(TAG_CLUSTER), Some("prod-eu"));
    }

    #[tokio::test]
    async fn test_tag_failure_repaired_on_rerun() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.inject(Fault::permission_denied(CloudOp::SetTags, "alpha-main"));

        let err = engine(&cloud, web_cluster("alpha")).run(false).await.unwrap_err();
        let ReconcileError::PartialConvergence { failed, skipped, cluster } = err else {
            panic!("expected partial convergence");
        };
        assert_eq!(failed[0].key.as_str(), "network/main");
        assert_eq!(failed[0].operation, Operation::Tag);
        assert_eq!(skipped.len(), 7);
        // The object exists, so its id is kept
        assert!(cluster.get(&"network/main".into()).unwrap().provider_id().is_some());

        cloud.clear_faults();
        let report = converge(&cloud, *cluster).await;
        assert_eq!(report.unchanged, keys(&["network/main"]));
        assert_eq!(report.created.len(), 7);

        let network = cloud.object(ResourceKind::Network, "alpha-main").unwrap();
        assert_eq!(network.tags.get(TAG_RESOURCE), Some("network/main"));
    }

    #[tokio::test]
    async fn test_lease_for_other_cluster_refused() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster: Cluster = web_cluster("alpha");
        let mut engine = ConvergenceEngine::new(
            EngineConfig::default(),
            cloud.clone(),
            cluster,
            Arc::new(StaticLease("beta".into())),
        );

        assert!(matches!(
            engine.run(false).await,
            Err(ReconcileError::LockNotHeld { .. })
        ));
        assert!(cloud.journal().is_empty());
    }
}
