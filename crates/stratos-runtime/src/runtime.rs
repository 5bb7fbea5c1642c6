//! # Run Orchestration
//!
//! One run, start to finish:
//!
//! 1. Take the cluster lock (held until the run's state is persisted)
//! 2. Load the stored document, merge the declaration file if given
//! 3. Reconcile or destroy
//! 4. Persist the resulting document, even a partial one; purge after a
//!    teardown when asked

use crate::config::RuntimeConfig;
use crate::document::{fill_identity, merge_declared, prune_deleted};
use crate::error::RuntimeError;
use serde::Serialize;
use shared_types::{Cluster, ResourceKey};
use st_02_convergence::{CloudProvider, ConvergenceEngine, RunLease, RunOutcome};
use st_03_state_store::StateCoordinator;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Reconcile,
    Destroy,
}

/// What a successful run did, printed as JSON by the binary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub cluster: String,
    pub run_id: Uuid,
    pub action: Action,
    pub created: Vec<ResourceKey>,
    pub updated: Vec<ResourceKey>,
    pub deleted: Vec<ResourceKey>,
    pub unchanged: Vec<ResourceKey>,
    pub already_gone: Vec<ResourceKey>,
    pub purged: bool,
}

pub struct Runtime {
    config: RuntimeConfig,
    coordinator: Arc<StateCoordinator>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let coordinator = Arc::new(StateCoordinator::new(config.state.clone()));
        Self { config, coordinator }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &StateCoordinator {
        &self.coordinator
    }

    /// Document to run against: the declaration file merged over the
    /// stored state, or the stored state alone.
    fn document(&self, stored: Option<Cluster>) -> Result<Cluster, RuntimeError> {
        let mut cluster = match &self.config.cluster_file {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|source| RuntimeError::ClusterFile {
                    path: path.clone(),
                    source,
                })?;
                let declared: Cluster =
                    serde_json::from_slice(&bytes).map_err(|source| RuntimeError::ClusterFileFormat {
                        path: path.clone(),
                        source,
                    })?;
                merge_declared(declared, stored)
            }
            None => stored.ok_or_else(|| RuntimeError::NoDocument(self.config.name.clone()))?,
        };

        if cluster.name != self.config.name {
            return Err(RuntimeError::NameMismatch {
                expected: self.config.name.clone(),
                found: cluster.name,
            });
        }
        fill_identity(&mut cluster, &self.config.cloud_id, &self.config.profile);
        Ok(cluster)
    }

    /// Take the cluster lock on the blocking pool: waiting for a busy file
    /// lock sleeps the thread until the lock is free or the timeout passes.
    async fn lock(&self, name: &str) -> Result<Arc<dyn RunLease>, RuntimeError> {
        let coordinator = Arc::clone(&self.coordinator);
        let name = name.to_string();
        let lease = tokio::task::spawn_blocking(move || coordinator.lock(&name))
            .await
            .map_err(RuntimeError::LockTask)??;
        Ok(lease)
    }

    /// Run once against `provider`. Sending `true` on `cancel` stops new
    /// work; whatever converged so far is still persisted.
    pub async fn execute(
        &self,
        provider: Arc<dyn CloudProvider>,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary, RuntimeError> {
        let name = self.config.name.as_str();
        let mut interrupt = cancel.clone();
        let lease = tokio::select! {
            lease = self.lock(name) => lease?,
            () = interrupted(&mut interrupt) => {
                warn!(cluster = %name, "Interrupted while waiting for the cluster lock");
                return Err(RuntimeError::InterruptedWaitingForLock(name.to_string()));
            }
        };

        let stored = self.coordinator.load(name)?;
        let cluster = self.document(stored)?;

        let mut engine =
            ConvergenceEngine::new(self.config.engine.clone(), provider, cluster, lease)
                .with_cancellation(cancel);
        let run_id = engine.run_id();
        let action = if self.config.teardown {
            Action::Destroy
        } else {
            Action::Reconcile
        };
        info!(cluster = %name, %run_id, action = ?action, "Run starting");

        let outcome = match engine.run(self.config.teardown).await {
            Ok(outcome) => outcome,
            Err(e) => {
                match e.partial_cluster() {
                    Some(partial) => {
                        warn!(cluster = %name, error = %e, "Run incomplete, persisting partial state");
                        self.coordinator.persist(partial)?;
                    }
                    None => error!(cluster = %name, error = %e, "Run failed before any change"),
                }
                return Err(e.into());
            }
        };

        let summary = match outcome {
            RunOutcome::Converged(report) => {
                self.coordinator.persist(&prune_deleted(report.cluster))?;
                RunSummary {
                    cluster: name.to_string(),
                    run_id,
                    action,
                    created: report.created,
                    updated: report.updated,
                    deleted: report.deleted,
                    unchanged: report.unchanged,
                    already_gone: Vec::new(),
                    purged: false,
                }
            }
            RunOutcome::Destroyed(report) => {
                if self.config.purge {
                    self.coordinator.purge(name)?;
                } else {
                    self.coordinator.persist(&report.cluster)?;
                }
                RunSummary {
                    cluster: name.to_string(),
                    run_id,
                    action,
                    created: Vec::new(),
                    updated: Vec::new(),
                    deleted: report.deleted,
                    unchanged: Vec::new(),
                    already_gone: report.already_gone,
                    purged: self.config.purge,
                }
            }
        };

        info!(
            cluster = %name,
            %run_id,
            created = summary.created.len(),
            updated = summary.updated.len(),
            deleted = summary.deleted.len(),
            unchanged = summary.unchanged.len(),
            "Run finished"
        );
        Ok(summary)
    }
}

/// Resolves once `true` is sent; never, if the sender goes away first.
async fn interrupted(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
