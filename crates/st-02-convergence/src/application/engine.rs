//! Convergence Engine
//!
//! Drives one run over one cluster:
//! 1. `init`: lease check, identity validation, overrides, graph, auth
//! 2. `get_actual`: observe in topological order, rendering what exists
//! 3. `get_expected`: desired state and the change set
//! 4. `reconcile`: forward pass (create/update), then reverse delete pass
//!    or `destroy`: reverse delete of everything observed
//!
//! Structural problems surface before the first provider mutation. Node
//! failures never roll back: the partially converged document is returned
//! and a later run resumes from it.

use crate::adapters::resources::{AdapterRegistry, ProviderClient, ResourceAdapter};
use crate::algorithms::differ::diff;
use crate::algorithms::tags::TagPropagator;
use crate::application::scheduler::{Direction, Dispatch, PassOutcome, Scheduler, TaskResult};
use crate::config::EngineConfig;
use crate::domain::entities::{
    ActualSnapshot, ConvergenceReport, DestroyReport, ExpectedSnapshot, NodeOutcome, Observed,
    Phase, ResourceState,
};
use crate::domain::errors::{NodeFailure, ReconcileError, StructuralError};
use crate::domain::value_objects::{Change, ChangeSet, DiffMode, Operation};
use crate::ports::inbound::Reconciler;
use crate::ports::outbound::{CloudProvider, Resource, RunLease};
use async_trait::async_trait;
use shared_types::{Cluster, ClusterError, ResourceKey, TagSet};
use st_01_resource_graph::{ResourceGraph, ResourceGraphApi, ResourceGraphService};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What `run` ended with.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Converged(ConvergenceReport),
    Destroyed(DestroyReport),
}

impl RunOutcome {
    pub fn cluster(&self) -> &Cluster {
        match self {
            RunOutcome::Converged(report) => &report.cluster,
            RunOutcome::Destroyed(report) => &report.cluster,
        }
    }
}

/// Reconciler for one cluster document.
pub struct ConvergenceEngine {
    config: EngineConfig,
    client: ProviderClient,
    registry: AdapterRegistry,
    lease: Arc<dyn RunLease>,
    document: Cluster,
    phase: Phase,
    run_id: Uuid,
    cancel: Option<watch::Receiver<bool>>,
    graph: Option<ResourceGraph>,
    tags: Option<TagPropagator>,
    actual: ActualSnapshot,
    expected: ExpectedSnapshot,
    changes: Option<ChangeSet>,
}

impl ConvergenceEngine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn CloudProvider>,
        cluster: Cluster,
        lease: Arc<dyn RunLease>,
    ) -> Self {
        let client = ProviderClient::new(provider, config.retry.clone());
        let registry = AdapterRegistry::new(client.clone());
        Self {
            config,
            client,
            registry,
            lease,
            document: cluster,
            phase: Phase::Uninitialized,
            run_id: Uuid::new_v4(),
            cancel: None,
            graph: None,
            tags: None,
            actual: ActualSnapshot::new(),
            expected: ExpectedSnapshot::new(),
            changes: None,
        }
    }

    /// Stop dispatching new work once `true` is sent on this channel.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn graph(&self) -> Option<&ResourceGraph> {
        self.graph.as_ref()
    }

    pub fn into_document(self) -> Cluster {
        self.document
    }

    /// Full run: converge, or tear down when `teardown` is set.
    pub async fn run(&mut self, teardown: bool) -> Result<RunOutcome, ReconcileError> {
        self.init().await?;
        self.get_actual().await?;
        if teardown {
            return self.destroy().await.map(RunOutcome::Destroyed);
        }
        self.get_expected().await?;
        self.reconcile().await.map(RunOutcome::Converged)
    }

    fn require_phase(&self, allowed: &[Phase], operation: &'static str) -> Result<(), ReconcileError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ReconcileError::InvalidTransition {
                phase: self.phase,
                operation,
            })
        }
    }

    /// Record the failure in the phase before handing it back.
    fn failed<T>(&mut self, error: ReconcileError) -> Result<T, ReconcileError> {
        warn!(run_id = %self.run_id, cluster = %self.document.name, error = %error, "[st-02] Run failed");
        self.phase = Phase::Failed;
        Err(error)
    }

    fn graph_or_err(&self, operation: &'static str) -> Result<&ResourceGraph, ReconcileError> {
        self.graph.as_ref().ok_or(ReconcileError::InvalidTransition {
            phase: self.phase,
            operation,
        })
    }

    async fn init_inner(&mut self) -> Result<(), ReconcileError> {
        if self.lease.cluster_name() != self.document.name || !self.lease.is_held() {
            return Err(ReconcileError::LockNotHeld {
                cluster: self.document.name.clone(),
            });
        }

        self.document.validate_identity()?;
        if !self.config.overrides.is_empty() {
            self.config.overrides.apply(&mut self.document)?;
        }

        // Cycles and dangling references are rejected before any provider call
        let graph = ResourceGraphService::new().build(&self.document)?;
        let tags = TagPropagator::new(&self.config.tags, &self.document)?;

        let cluster_key = ResourceKey::new(format!("cluster/{}", self.document.name));
        self.client
            .authenticate(&cluster_key, &self.document.profile, &self.document.cloud_id)
            .await
            .map_err(ReconcileError::Authentication)?;

        info!(
            run_id = %self.run_id,
            cluster = %self.document.name,
            profile = %self.document.profile,
            resources = graph.node_count(),
            levels = graph.levels().len(),
            "[st-02] Initialized"
        );

        self.graph = Some(graph);
        self.tags = Some(tags);
        Ok(())
    }

    async fn get_actual_inner(&mut self) -> Result<(), ReconcileError> {
        let order = self.graph_or_err("get_actual")?.order().to_vec();
        let mut actual = ActualSnapshot::new();

        for key in order {
            let decl = self
                .document
                .get(&key)
                .cloned()
                .ok_or_else(|| ClusterError::UnknownResource { key: key.clone() })?;
            let adapter = self.registry.for_kind(decl.kind);

            let observed = adapter
                .actual(&decl, &self.document)
                .await
                .map_err(|source| ReconcileError::Observe {
                    key: key.clone(),
                    source,
                })?;

            // Dependents observed later resolve against what is rendered here
            match &observed {
                Observed::Found(state) => {
                    let patch = adapter.render(state)?;
                    self.document.render(&patch.key, patch.outputs)?;
                }
                Observed::NotFound if !decl.outputs.is_empty() => {
                    debug!(resource = %key, "Rendered outputs are stale, clearing");
                    self.document.clear_outputs(&key)?;
                }
                Observed::NotFound => {}
            }

            debug!(resource = %key, found = observed.is_found(), "Observed");
            actual.insert(key, observed);
        }

        let found = actual.values().filter(|o| o.is_found()).count();
        info!(
            run_id = %self.run_id,
            found,
            missing = actual.len() - found,
            "[st-02] Actual state gathered"
        );
        self.actual = actual;
        Ok(())
    }

    /// Absent declarations must not have present dependents.
    fn check_absent_dependencies(&self, graph: &ResourceGraph) -> Result<(), StructuralError> {
        for decl in self.document.resources.iter().filter(|d| !d.is_absent()) {
            for dependency in graph.dependencies(&decl.key) {
                if self.document.get(dependency).is_some_and(|d| d.is_absent()) {
                    return Err(StructuralError::AbsentDependency {
                        absent: dependency.clone(),
                        dependent: decl.key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every reference must name an output its target kind renders.
    fn check_reference_fields(&self) -> Result<(), StructuralError> {
        for decl in &self.document.resources {
            for reference in decl.references() {
                let Some(target) = self.document.get(&reference.key) else {
                    return Err(ClusterError::UnknownResource {
                        key: reference.key.clone(),
                    }
                    .into());
                };
                let fields = self.registry.for_kind(target.kind).output_fields();
                if !fields.contains(&reference.field.as_str()) {
                    return Err(StructuralError::UnknownOutput {
                        key: decl.key.clone(),
                        reference: reference.clone(),
                        target_kind: target.kind,
                    });
                }
            }
        }
        Ok(())
    }

    fn get_expected_inner(&mut self) -> Result<(), ReconcileError> {
        let graph = self.graph_or_err("get_expected")?;
        self.check_absent_dependencies(graph)?;
        self.check_reference_fields()?;

        let mut expected = ExpectedSnapshot::new();
        let mut entries = Vec::with_capacity(graph.node_count());

        for key in graph.order() {
            let decl = self
                .document
                .get(key)
                .ok_or_else(|| ClusterError::UnknownResource { key: key.clone() })?;
            let state = self
                .registry
                .for_kind(decl.kind)
                .expected(decl, &self.document)?;

            let observed = self.actual.get(key).unwrap_or(&Observed::NotFound);
            let change = diff(observed, state.as_ref(), self.config.diff_mode);
            debug!(resource = %key, change = change.label(), "Planned");

            entries.push((key.clone(), change));
            expected.insert(key.clone(), state);
        }

        let changes = ChangeSet::new(entries);
        let counts = changes.counts();
        info!(
            run_id = %self.run_id,
            create = counts.create,
            update = counts.update,
            delete = counts.delete,
            unchanged = counts.unchanged,
            "[st-02] Change set computed"
        );

        self.expected = expected;
        self.changes = Some(changes);
        Ok(())
    }

    /// Delete `members` in reverse dependency order, clearing their outputs.
    async fn delete_pass(&mut self, members: &[ResourceKey]) -> PassOutcome {
        let Some(graph) = self.graph.as_ref() else {
            return PassOutcome::default();
        };
        let registry = &self.registry;
        let actual = &self.actual;
        let scheduler = Scheduler::new(graph, Direction::Reverse, self.config.workers());

        scheduler
            .run(members, &mut self.document, &mut self.cancel, |key, document| {
                let Some(state) = actual.get(key).and_then(Observed::state).cloned() else {
                    return Dispatch::Done(NodeOutcome::Deleted);
                };
                let Some(decl) = document.get(key) else {
                    return Dispatch::Failed(NodeFailure::new(
                        key.clone(),
                        Operation::Delete,
                        StructuralError::from(ClusterError::UnknownResource { key: key.clone() }),
                    ));
                };
                let adapter = registry.for_kind(decl.kind).clone();
                let key = key.clone();

                Dispatch::Spawn(Box::pin(async move {
                    match adapter.delete(&state).await {
                        Ok(()) => TaskResult {
                            key,
                            patch: None,
                            clear_outputs: true,
                            outcome: Ok(NodeOutcome::Deleted),
                        },
                        Err(e) => TaskResult::failed(key, Operation::Delete, e),
                    }
                }))
            })
            .await
    }

    /// Node failures win over an interrupt: they need attention either way.
    fn partial_error(
        &self,
        mut failed: Vec<NodeFailure>,
        mut skipped: Vec<ResourceKey>,
        pending: Vec<ResourceKey>,
        interrupted: bool,
    ) -> ReconcileError {
        let cluster = Box::new(self.document.clone());
        if failed.is_empty() && interrupted {
            return ReconcileError::Interrupted { pending, cluster };
        }

        let position = |key: &ResourceKey| self.graph.as_ref().and_then(|g| g.position(key));
        failed.sort_by_key(|f| position(&f.key));
        skipped.extend(pending);
        skipped.sort_by_key(|k| position(k));
        skipped.dedup();
        ReconcileError::PartialConvergence {
            failed,
            skipped,
            cluster,
        }
    }
}

/// Substitute every reference in a desired state against the live document.
fn resolve_state(expected: &ResourceState, document: &Cluster) -> Result<ResourceState, ClusterError> {
    let mut resolved = expected.clone();
    for value in resolved.attributes.values_mut() {
        *value = document.resolve(value)?;
    }
    Ok(resolved)
}

fn classify(before: &Observed, after: &ResourceState) -> NodeOutcome {
    match before {
        Observed::NotFound => NodeOutcome::Created,
        Observed::Found(state) if state == after => NodeOutcome::Unchanged,
        Observed::Found(state) if state.provider_id != after.provider_id => NodeOutcome::Replaced,
        Observed::Found(_) => NodeOutcome::Updated,
    }
}

/// Apply, render, then tag one node.
fn apply_task(
    adapter: ResourceAdapter,
    key: ResourceKey,
    observed: Observed,
    expected: ResourceState,
    tags: TagSet,
    mode: DiffMode,
) -> Dispatch {
    Dispatch::Spawn(Box::pin(async move {
        let state = match adapter.apply(&observed, &expected, mode).await {
            Ok(state) => state,
            Err(e) => return TaskResult::failed(key, Operation::Apply, e),
        };
        let outcome = classify(&observed, &state);

        let patch = match adapter.render(&state) {
            Ok(patch) => patch,
            Err(e) => return TaskResult::failed(key, Operation::Render, e),
        };

        // The patch is kept even if tagging fails: the object exists
        let tagged = if outcome == NodeOutcome::Unchanged && state.tags.contains_all(&tags) {
            Ok(())
        } else {
            adapter.tag(&state, &tags).await
        };

        TaskResult {
            key: key.clone(),
            patch: Some(patch),
            clear_outputs: false,
            outcome: tagged
                .map(|_| outcome)
                .map_err(|e| NodeFailure::new(key, Operation::Tag, e)),
        }
    }))
}

/// Re-tag an unchanged node that is missing ownership tags.
fn retag_task(adapter: ResourceAdapter, key: ResourceKey, state: ResourceState, tags: TagSet) -> Dispatch {
    Dispatch::Spawn(Box::pin(async move {
        match adapter.tag(&state, &tags).await {
            Ok(()) => TaskResult {
                key,
                patch: None,
                clear_outputs: false,
                outcome: Ok(NodeOutcome::Unchanged),
            },
            Err(e) => TaskResult::failed(key, Operation::Tag, e),
        }
    }))
}

fn plan_forward(
    key: &ResourceKey,
    document: &Cluster,
    registry: &AdapterRegistry,
    actual: &ActualSnapshot,
    expected: &ExpectedSnapshot,
    propagator: &TagPropagator,
    mode: DiffMode,
) -> Dispatch {
    let fail = |operation: Operation, error: StructuralError| Dispatch::Failed(NodeFailure::new(key.clone(), operation, error));

    let Some(decl) = document.get(key) else {
        return fail(Operation::Expected, ClusterError::UnknownResource { key: key.clone() }.into());
    };
    let Some(Some(declared)) = expected.get(key) else {
        return Dispatch::Done(NodeOutcome::Unchanged);
    };

    // Dependencies have committed their outputs by now
    let desired = match resolve_state(declared, document) {
        Ok(desired) => desired,
        Err(e) => return fail(Operation::Expected, e.into()),
    };
    let tags = match propagator.for_resource(key, &desired.attributes) {
        Ok(tags) => tags,
        Err(e) => return fail(Operation::Tag, e),
    };

    let adapter = registry.for_kind(decl.kind).clone();
    let observed = actual.get(key).cloned().unwrap_or(Observed::NotFound);

    match (diff(&observed, Some(&desired), mode), observed) {
        (Change::Unchanged, Observed::Found(state)) => {
            if state.tags.contains_all(&tags) {
                Dispatch::Done(NodeOutcome::Unchanged)
            } else {
                debug!(resource = %key, "Unchanged but missing ownership tags");
                retag_task(adapter, key.clone(), state, tags)
            }
        }
        (_, observed) => apply_task(adapter, key.clone(), observed, desired, tags, mode),
    }
}

#[async_trait]
impl Reconciler for ConvergenceEngine {
    async fn init(&mut self) -> Result<(), ReconcileError> {
        self.require_phase(&[Phase::Uninitialized], "init")?;
        match self.init_inner().await {
            Ok(()) => {
                self.phase = Phase::Init;
                Ok(())
            }
            Err(e) => self.failed(e),
        }
    }

    async fn get_actual(&mut self) -> Result<&ActualSnapshot, ReconcileError> {
        self.require_phase(&[Phase::Init], "get_actual")?;
        match self.get_actual_inner().await {
            Ok(()) => {
                self.phase = Phase::ActualGathered;
                Ok(&self.actual)
            }
            Err(e) => self.failed(e),
        }
    }

    async fn get_expected(&mut self) -> Result<&ExpectedSnapshot, ReconcileError> {
        self.require_phase(&[Phase::ActualGathered], "get_expected")?;
        match self.get_expected_inner() {
            Ok(()) => {
                self.phase = Phase::ExpectedGathered;
                Ok(&self.expected)
            }
            Err(e) => self.failed(e),
        }
    }

    async fn reconcile(&mut self) -> Result<ConvergenceReport, ReconcileError> {
        self.require_phase(&[Phase::ExpectedGathered], "reconcile")?;
        self.phase = Phase::Reconciling;

        let (Some(graph), Some(propagator), Some(changes)) =
            (self.graph.as_ref(), self.tags.as_ref(), self.changes.as_ref())
        else {
            return Err(ReconcileError::InvalidTransition {
                phase: self.phase,
                operation: "reconcile",
            });
        };

        let forward_members: Vec<ResourceKey> = graph
            .order()
            .iter()
            .filter(|k| matches!(self.expected.get(*k), Some(Some(_))))
            .cloned()
            .collect();
        let delete_members: Vec<ResourceKey> = graph
            .order()
            .iter()
            .filter(|k| matches!(changes.get(k), Some(Change::Delete)))
            .cloned()
            .collect();

        info!(
            run_id = %self.run_id,
            apply = forward_members.len(),
            delete = delete_members.len(),
            workers = self.config.workers(),
            "[st-02] Reconciling"
        );

        let registry = &self.registry;
        let actual = &self.actual;
        let expected = &self.expected;
        let mode = self.config.diff_mode;
        let forward = Scheduler::new(graph, Direction::Forward, self.config.workers())
            .run(&forward_members, &mut self.document, &mut self.cancel, |key, document| {
                plan_forward(key, document, registry, actual, expected, propagator, mode)
            })
            .await;

        // Deletes only after every create and update succeeded
        let deletes = if forward.is_clean() {
            self.delete_pass(&delete_members).await
        } else {
            PassOutcome {
                pending: if forward.interrupted { delete_members.clone() } else { Vec::new() },
                skipped: if forward.interrupted { Vec::new() } else { delete_members.clone() },
                ..PassOutcome::default()
            }
        };

        if !forward.is_clean() || !deletes.is_clean() {
            let interrupted = forward.interrupted || deletes.interrupted;
            let failed = forward.failed.into_iter().chain(deletes.failed).collect();
            let skipped = forward.skipped.into_iter().chain(deletes.skipped).collect();
            let pending = forward.pending.into_iter().chain(deletes.pending).collect();
            let error = self.partial_error(failed, skipped, pending, interrupted);
            return self.failed(error);
        }

        let mut updated = forward.keys_with(NodeOutcome::Updated);
        updated.extend(forward.keys_with(NodeOutcome::Replaced));
        let report = ConvergenceReport {
            cluster: self.document.clone(),
            created: forward.keys_with(NodeOutcome::Created),
            updated,
            deleted: deletes.keys_with(NodeOutcome::Deleted),
            unchanged: forward.keys_with(NodeOutcome::Unchanged),
        };

        info!(
            run_id = %self.run_id,
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            unchanged = report.unchanged.len(),
            "[st-02] Converged"
        );
        self.phase = Phase::Converged;
        Ok(report)
    }

    async fn destroy(&mut self) -> Result<DestroyReport, ReconcileError> {
        self.require_phase(&[Phase::ActualGathered, Phase::ExpectedGathered], "destroy")?;
        self.phase = Phase::Destroying;

        let members: Vec<ResourceKey> = self
            .actual
            .iter()
            .filter(|(_, observed)| observed.is_found())
            .map(|(key, _)| key.clone())
            .collect();
        let already_gone: Vec<ResourceKey> = match self.graph.as_ref() {
            Some(graph) => graph
                .order()
                .iter()
                .filter(|k| matches!(self.actual.get(*k), Some(Observed::NotFound)))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        info!(run_id = %self.run_id, delete = members.len(), "[st-02] Destroying");
        let outcome = self.delete_pass(&members).await;

        if !outcome.is_clean() {
            let error = self.partial_error(outcome.failed, outcome.skipped, outcome.pending, outcome.interrupted);
            return self.failed(error);
        }

        let report = DestroyReport {
            cluster: self.document.clone(),
            deleted: outcome.keys_with(NodeOutcome::Deleted),
            already_gone,
        };
        info!(
            run_id = %self.run_id,
            deleted = report.deleted.len(),
            already_gone = report.already_gone.len(),
            "[st-02] Destroyed"
        );
        self.phase = Phase::Destroyed;
        Ok(report)
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn changes(&self) -> Option<&ChangeSet> {
        self.changes.as_ref()
    }

    fn document(&self) -> &Cluster {
        &self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cloud::{CloudOp, Fault, InMemoryCloud, JournalEntry};
    use crate::algorithms::overrides::Overrides;
    use crate::algorithms::tags::{TAG_CLUSTER, TAG_MANAGED_ATTRS, TAG_RESOURCE};
    use crate::ports::outbound::mocks::MockLease;
    use shared_types::{AttrRef, AttrValue, Attributes, Ensure, ResourceDecl, ResourceKind};
    use st_01_resource_graph::GraphError;

    fn tcp_rule() -> AttrValue {
        let mut rule = Attributes::new();
        rule.insert("protocol".into(), "tcp".into());
        rule.insert("ports".into(), AttrValue::List(vec![80_i64.into(), 443_i64.into()]));
        AttrValue::Map(rule)
    }

    /// network <- subnet <- pool <- lb, network <- firewall, subnet <- lb
    fn sample() -> Cluster {
        Cluster::new("alpha", "proj-1", "local")
            .with_resource(
                ResourceDecl::new("network/main", ResourceKind::Network).with_attr("cidr", "10.0.0.0/16"),
            )
            .with_resource(
                ResourceDecl::new("subnet/a", ResourceKind::Subnet)
                    .with_attr("network", AttrRef::id("network/main"))
                    .with_attr("cidr", "10.0.1.0/24"),
            )
            .with_resource(
                ResourceDecl::new("firewall/web", ResourceKind::Firewall)
                    .with_attr("network", AttrRef::id("network/main"))
                    .with_attr("rules", AttrValue::List(vec![tcp_rule()])),
            )
            .with_resource(
                ResourceDecl::new("compute_pool/workers", ResourceKind::ComputePool)
                    .with_attr("subnet", AttrRef::id("subnet/a"))
                    .with_attr("image", "ubuntu-22.04")
                    .with_attr("machine_type", "n1-standard-2")
                    .with_attr("size", 3_i64),
            )
            .with_resource(
                ResourceDecl::new("load_balancer/web", ResourceKind::LoadBalancer)
                    .with_attr("subnet", AttrRef::id("subnet/a"))
                    .with_attr("listeners", AttrValue::List(vec![80_i64.into()]))
                    .with_attr("targets", AttrRef::new("compute_pool/workers", "instance_group")),
            )
    }

    fn engine(cloud: &Arc<InMemoryCloud>, cluster: Cluster) -> ConvergenceEngine {
        engine_with(cloud, cluster, EngineConfig::default())
    }

    fn engine_with(cloud: &Arc<InMemoryCloud>, cluster: Cluster, config: EngineConfig) -> ConvergenceEngine {
        ConvergenceEngine::new(config, cloud.clone(), cluster, Arc::new(MockLease::held("alpha")))
    }

    async fn converge(cloud: &Arc<InMemoryCloud>, cluster: Cluster) -> ConvergenceReport {
        converge_with(cloud, cluster, EngineConfig::default()).await
    }

    async fn converge_with(cloud: &Arc<InMemoryCloud>, cluster: Cluster, config: EngineConfig) -> ConvergenceReport {
        match engine_with(cloud, cluster, config).run(false).await {
            Ok(RunOutcome::Converged(report)) => report,
            other => panic!("expected convergence, got {:?}", other),
        }
    }

    fn keys(raw: &[&str]) -> Vec<ResourceKey> {
        raw.iter().map(|k| ResourceKey::from(*k)).collect()
    }

    /// Firewalls and load balancers may share a name, so match on kind too.
    fn find(journal: &[JournalEntry], op: CloudOp, kind: ResourceKind, target: &str) -> JournalEntry {
        journal
            .iter()
            .find(|e| e.op == op && e.kind == Some(kind) && e.target == target && e.ok)
            .cloned()
            .unwrap_or_else(|| panic!("no successful {} on {} {}", op, kind, target))
    }

    #[tokio::test]
    async fn test_converges_empty_cloud() {
        let cloud = Arc::new(InMemoryCloud::new());
        let report = converge(&cloud, sample()).await;

        assert_eq!(report.created.len(), 5);
        assert!(report.updated.is_empty() && report.deleted.is_empty());
        for decl in &report.cluster.resources {
            assert!(decl.provider_id().is_some(), "{} not rendered", decl.key);
        }

        // Render propagated the pool's instance group into the balancer
        let pool = cloud.object(ResourceKind::ComputePool, "alpha-workers").unwrap();
        let lb = cloud.object(ResourceKind::LoadBalancer, "alpha-web").unwrap();
        assert_eq!(lb.attributes.get("targets"), pool.attributes.get("instance_group"));
    }

    #[tokio::test]
    async fn test_every_touched_resource_is_tagged() {
        let cloud = Arc::new(InMemoryCloud::new());
        let report = converge(&cloud, sample()).await;

        for decl in &report.cluster.resources {
            let id = decl.provider_id().unwrap();
            let object = cloud.objects().into_iter().find(|o| o.id == id).unwrap();
            assert_eq!(object.tags.get(TAG_CLUSTER), Some("alpha"));
            assert_eq!(object.tags.get(TAG_RESOURCE), Some(decl.key.as_str()));
        }
    }

    #[tokio::test]
    async fn test_second_run_makes_no_mutations() {
        let cloud = Arc::new(InMemoryCloud::new());
        let report = converge(&cloud, sample()).await;
        cloud.clear_journal();

        let again = converge(&cloud, report.cluster.clone()).await;

        assert!(again.is_noop());
        assert_eq!(again.unchanged.len(), 5);
        assert!(cloud.mutations().is_empty());
        assert_eq!(again.cluster, report.cluster);
    }

    #[tokio::test]
    async fn test_dependencies_finish_before_dependents_start() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = sample();
        converge(&cloud, cluster.clone()).await;
        let journal = cloud.journal();

        let name = |key: &ResourceKey| format!("alpha-{}", key.name());
        let graph = st_01_resource_graph::build_resource_graph(&cluster).unwrap();
        for decl in &cluster.resources {
            for dependency in graph.dependencies(&decl.key) {
                let dependency_kind = cluster.get(dependency).unwrap().kind;
                let before = find(&journal, CloudOp::Create, dependency_kind, &name(dependency));
                let after = find(&journal, CloudOp::Create, decl.kind, &name(&decl.key));
                assert!(
                    before.end < after.begin,
                    "{} created before {} finished",
                    decl.key,
                    dependency
                );
            }
        }
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_provider_calls() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = Cluster::new("alpha", "proj-1", "local")
            .with_resource(
                ResourceDecl::new("network/r1", ResourceKind::Network)
                    .with_attr("cidr", "10.0.0.0/16")
                    .with_dependency("network/r2"),
            )
            .with_resource(
                ResourceDecl::new("network/r2", ResourceKind::Network)
                    .with_attr("cidr", "10.1.0.0/16")
                    .with_dependency("network/r1"),
            );

        let err = engine(&cloud, cluster).run(false).await.unwrap_err();

        match err {
            ReconcileError::Structural(StructuralError::Graph(GraphError::CycleDetected { mut members })) => {
                members.sort();
                assert_eq!(members, keys(&["network/r1", "network/r2"]));
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
        assert!(cloud.journal().is_empty());
    }

    #[tokio::test]
    async fn test_refuses_to_run_without_lease() {
        let cloud = Arc::new(InMemoryCloud::new());

        let mut foreign = ConvergenceEngine::new(
            EngineConfig::default(),
            cloud.clone(),
            sample(),
            Arc::new(MockLease::held("beta")),
        );
        assert!(matches!(foreign.init().await, Err(ReconcileError::LockNotHeld { .. })));
        assert_eq!(foreign.phase(), Phase::Failed);

        let lease = Arc::new(MockLease::held("alpha"));
        lease.release();
        let mut released = ConvergenceEngine::new(EngineConfig::default(), cloud.clone(), sample(), lease);
        assert!(matches!(released.init().await, Err(ReconcileError::LockNotHeld { .. })));

        assert!(cloud.journal().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_calls_rejected() {
        let cloud = Arc::new(InMemoryCloud::new());
        let mut engine = engine(&cloud, sample());

        assert!(matches!(
            engine.reconcile().await,
            Err(ReconcileError::InvalidTransition { phase: Phase::Uninitialized, .. })
        ));

        engine.init().await.unwrap();
        assert!(matches!(
            engine.get_expected().await,
            Err(ReconcileError::InvalidTransition { phase: Phase::Init, .. })
        ));
        assert!(matches!(
            engine.init().await,
            Err(ReconcileError::InvalidTransition { .. })
        ));
        // Rejected calls leave the phase alone
        assert_eq!(engine.phase(), Phase::Init);
    }

    #[tokio::test]
    async fn test_partial_failure_then_resume() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.inject(Fault::permission_denied(CloudOp::Create, "alpha-a"));

        let err = engine(&cloud, sample()).run(false).await.unwrap_err();
        let ReconcileError::PartialConvergence { failed, skipped, cluster } = err else {
            panic!("expected partial convergence");
        };

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key.as_str(), "subnet/a");
        assert_eq!(failed[0].operation, Operation::Apply);
        assert!(failed[0].error.is_permission_denied());
        assert_eq!(skipped, keys(&["compute_pool/workers", "load_balancer/web"]));

        // What did converge is recorded in the returned document
        assert!(cluster.get(&"network/main".into()).unwrap().provider_id().is_some());
        assert!(cluster.get(&"firewall/web".into()).unwrap().provider_id().is_some());
        assert!(cluster.get(&"subnet/a".into()).unwrap().provider_id().is_none());

        cloud.clear_faults();
        let report = converge(&cloud, *cluster).await;

        assert_eq!(
            report.created,
            keys(&["subnet/a", "compute_pool/workers", "load_balancer/web"])
        );
        assert_eq!(report.unchanged, keys(&["network/main", "firewall/web"]));
        assert_eq!(cloud.objects().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.inject(Fault::transient(CloudOp::Create, "alpha-main", 2));

        let report = converge(&cloud, sample()).await;

        assert_eq!(report.created.len(), 5);
        let attempts = cloud
            .journal()
            .iter()
            .filter(|e| e.op == CloudOp::Create && e.target == "alpha-main")
            .count();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_mutable_change_updates_in_place() {
        let cloud = Arc::new(InMemoryCloud::new());
        let mut cluster = converge(&cloud, sample()).await.cluster;
        cluster
            .get_mut(&"compute_pool/workers".into())
            .unwrap()
            .attributes
            .insert("size".into(), AttrValue::Int(5));
        cloud.clear_journal();

        let report = converge(&cloud, cluster).await;

        assert_eq!(report.updated, keys(&["compute_pool/workers"]));
        assert!(report.created.is_empty());
        let mutated: Vec<(CloudOp, String)> = cloud
            .mutations()
            .into_iter()
            .map(|e| (e.op, e.target))
            .collect();
        assert_eq!(
            mutated,
            vec![
                (CloudOp::Update, "alpha-workers".to_string()),
                (CloudOp::SetTags, "alpha-workers".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_out_of_band_drift_corrected() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = converge(&cloud, sample()).await.cluster;
        assert!(cloud.set_out_of_band(ResourceKind::ComputePool, "alpha-workers", "size", AttrValue::Int(1)));

        let report = converge(&cloud, cluster).await;

        assert_eq!(report.updated, keys(&["compute_pool/workers"]));
        let pool = cloud.object(ResourceKind::ComputePool, "alpha-workers").unwrap();
        assert_eq!(pool.attributes.get("size"), Some(&AttrValue::Int(3)));
    }

    #[tokio::test]
    async fn test_vanished_resource_recreated() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = converge(&cloud, sample()).await.cluster;
        cloud.remove_out_of_band(ResourceKind::Firewall, "alpha-web");

        let report = converge(&cloud, cluster).await;

        assert_eq!(report.created, keys(&["firewall/web"]));
        assert_eq!(report.unchanged.len(), 4);
    }

    #[tokio::test]
    async fn test_absent_resource_deleted_after_applies() {
        let cloud = Arc::new(InMemoryCloud::new());
        let mut cluster = converge(&cloud, sample()).await.cluster;
        cluster.get_mut(&"load_balancer/web".into()).unwrap().ensure = Ensure::Absent;

        let report = converge(&cloud, cluster).await;

        assert_eq!(report.deleted, keys(&["load_balancer/web"]));
        assert!(cloud.object(ResourceKind::LoadBalancer, "alpha-web").is_none());
        let lb = report.cluster.get(&"load_balancer/web".into()).unwrap();
        assert!(lb.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_absent_dependency_is_structural() {
        let cloud = Arc::new(InMemoryCloud::new());
        let mut cluster = sample();
        cluster.get_mut(&"network/main".into()).unwrap().ensure = Ensure::Absent;

        let err = engine(&cloud, cluster).run(false).await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Structural(StructuralError::AbsentDependency { ref absent, ref dependent })
                if absent.as_str() == "network/main" && dependent.as_str() == "subnet/a"
        ));
        assert!(cloud.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_output_reference_is_structural() {
        let cloud = Arc::new(InMemoryCloud::new());
        let mut cluster = sample();
        cluster
            .get_mut(&"subnet/a".into())
            .unwrap()
            .attributes
            .insert("network".into(), AttrRef::new("network/main", "gateway").into());

        let err = engine(&cloud, cluster).run(false).await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Structural(StructuralError::UnknownOutput {
                target_kind: ResourceKind::Network,
                ..
            })
        ));
        assert!(cloud.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_deletes_in_reverse_order() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = converge(&cloud, sample()).await.cluster;
        cloud.clear_journal();

        let mut engine = engine(&cloud, cluster);
        let report = match engine.run(true).await {
            Ok(RunOutcome::Destroyed(report)) => report,
            other => panic!("expected destroy, got {:?}", other),
        };

        assert_eq!(report.deleted.len(), 5);
        assert!(report.already_gone.is_empty());
        assert!(cloud.objects().is_empty());
        assert!(report.cluster.resources.iter().all(|d| d.outputs.is_empty()));
        assert_eq!(engine.phase(), Phase::Destroyed);

        let journal = cloud.journal();
        let lb = find(&journal, CloudOp::Delete, ResourceKind::LoadBalancer, "alpha-web");
        let pool = find(&journal, CloudOp::Delete, ResourceKind::ComputePool, "alpha-workers");
        let subnet = find(&journal, CloudOp::Delete, ResourceKind::Subnet, "alpha-a");
        let network = find(&journal, CloudOp::Delete, ResourceKind::Network, "alpha-main");
        assert!(lb.end < pool.begin);
        assert!(pool.end < subnet.begin);
        assert!(subnet.end < network.begin);
    }

    #[tokio::test]
    async fn test_destroy_reports_already_gone() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = converge(&cloud, sample()).await.cluster;
        cloud.remove_out_of_band(ResourceKind::Firewall, "alpha-web");

        let report = match engine(&cloud, cluster).run(true).await {
            Ok(RunOutcome::Destroyed(report)) => report,
            other => panic!("expected destroy, got {:?}", other),
        };

        assert_eq!(report.already_gone, keys(&["firewall/web"]));
        assert_eq!(report.deleted.len(), 4);
    }

    #[tokio::test]
    async fn test_interrupt_before_reconcile_leaves_cloud_untouched() {
        let cloud = Arc::new(InMemoryCloud::new());
        let (tx, rx) = watch::channel(false);
        let mut engine = engine(&cloud, sample()).with_cancellation(rx);

        engine.init().await.unwrap();
        engine.get_actual().await.unwrap();
        engine.get_expected().await.unwrap();
        tx.send(true).unwrap();

        match engine.reconcile().await {
            Err(ReconcileError::Interrupted { pending, .. }) => assert_eq!(pending.len(), 5),
            other => panic!("expected interrupt, got {:?}", other),
        }
        assert!(cloud.mutations().is_empty());
        assert_eq!(engine.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn test_change_set_reflects_plan() {
        let cloud = Arc::new(InMemoryCloud::new());
        let mut engine = engine(&cloud, sample());
        engine.init().await.unwrap();
        engine.get_actual().await.unwrap();
        let expected = engine.get_expected().await.unwrap();

        // Unrendered references stay symbolic until dispatch
        let subnet = expected.get(&"subnet/a".into()).unwrap().as_ref().unwrap();
        assert!(!subnet.is_resolved());

        let counts = engine.changes().unwrap().counts();
        assert_eq!(counts.create, 5);
        assert!(!engine.changes().unwrap().is_converged());
    }

    #[tokio::test]
    async fn test_structural_mode_clears_provider_defaults() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cluster = converge(&cloud, sample()).await.cluster;
        let structural = EngineConfig {
            diff_mode: DiffMode::Structural,
            ..EngineConfig::default()
        };

        let mut engine = engine_with(&cloud, cluster, structural.clone());
        engine.init().await.unwrap();
        engine.get_actual().await.unwrap();
        engine.get_expected().await.unwrap();

        // The provider picked the routing mode; only structural comparison sees it
        assert!(matches!(
            engine.changes().unwrap().get(&"network/main".into()),
            Some(Change::Update { .. })
        ));

        cloud.clear_journal();
        let report = engine.reconcile().await.unwrap();
        assert_eq!(report.updated, keys(&["network/main"]));
        let network = cloud.object(ResourceKind::Network, "alpha-main").unwrap();
        assert!(!network.attributes.contains_key("routing_mode"));

        let report = converge_with(&cloud, report.cluster, structural).await;
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn test_removed_attribute_is_cleared_on_rerun() {
        let cloud = Arc::new(InMemoryCloud::new());
        let mut cluster = converge(&cloud, sample()).await.cluster;
        let lb = cloud.object(ResourceKind::LoadBalancer, "alpha-web").unwrap();
        assert!(lb.attributes.contains_key("targets"));

        cluster
            .get_mut(&"load_balancer/web".into())
            .unwrap()
            .attributes
            .remove("targets");
        cloud.clear_journal();
        let report = converge(&cloud, cluster).await;

        assert_eq!(report.updated, keys(&["load_balancer/web"]));
        let lb = cloud.object(ResourceKind::LoadBalancer, "alpha-web").unwrap();
        assert!(!lb.attributes.contains_key("targets"));
        assert_eq!(lb.tags.get(TAG_MANAGED_ATTRS), Some("listeners,subnet"));

        let report = converge(&cloud, report.cluster).await;
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn test_node_overrides_applied_before_expected() {
        let cloud = Arc::new(InMemoryCloud::new());
        let config = EngineConfig {
            overrides: Overrides::parse("", "", "machine_type=n2-standard-4").unwrap(),
            ..EngineConfig::default()
        };

        match engine_with(&cloud, sample(), config).run(false).await {
            Ok(RunOutcome::Converged(_)) => {}
            other => panic!("expected convergence, got {:?}", other),
        }

        let pool = cloud.object(ResourceKind::ComputePool, "alpha-workers").unwrap();
        assert_eq!(
            pool.attributes.get("machine_type"),
            Some(&AttrValue::from("n2-standard-4"))
        );
    }
}
