//! State Coordinator
//!
//! Owns the two things a run needs around the engine: exclusive access to
//! a cluster and durable storage of its document before and after the run.

use crate::adapters::{ClusterLock, FsStateStore, MemoryLocks, MemoryStateStore};
use crate::config::{StateConfig, StateKind};
use crate::domain::{validate_cluster_name, StateError};
use crate::ports::outbound::StateStore;
use shared_types::Cluster;
use st_02_convergence::RunLease;
use std::sync::Arc;
use tracing::info;

pub struct StateCoordinator {
    config: StateConfig,
    store: Arc<dyn StateStore>,
    memory_locks: MemoryLocks,
}

impl StateCoordinator {
    pub fn new(config: StateConfig) -> Self {
        let store: Arc<dyn StateStore> = match config.kind {
            StateKind::Fs => Arc::new(FsStateStore::new(&config.path)),
            StateKind::Memory => Arc::new(MemoryStateStore::new()),
        };
        Self::with_store(config, store)
    }

    /// Use an existing store; locking still follows `config.kind`.
    pub fn with_store(config: StateConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            config,
            store,
            memory_locks: MemoryLocks::new(),
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Take the run lease for `name`. Blocks up to the configured timeout
    /// for the filesystem store.
    pub fn lock(&self, name: &str) -> Result<Arc<dyn RunLease>, StateError> {
        validate_cluster_name(name)?;
        let lease: Arc<dyn RunLease> = match self.config.kind {
            StateKind::Fs => Arc::new(ClusterLock::acquire(
                &self.config.path,
                name,
                self.config.lock_timeout,
            )?),
            StateKind::Memory => Arc::new(self.memory_locks.acquire(name)?),
        };
        Ok(lease)
    }

    /// The stored document, or `None` for a cluster that was never
    /// committed.
    pub fn load(&self, name: &str) -> Result<Option<Cluster>, StateError> {
        match self.store.load(name) {
            Ok(cluster) => Ok(Some(cluster)),
            Err(StateError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn persist(&self, cluster: &Cluster) -> Result<(), StateError> {
        self.store.commit(cluster)
    }

    /// Forget a cluster after it has been torn down.
    pub fn purge(&self, name: &str) -> Result<(), StateError> {
        self.store.destroy(name)?;
        info!(cluster = %name, kind = %self.config.kind, "[st-03] Purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LockError;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fs_config(root: &TempDir) -> StateConfig {
        StateConfig {
            kind: StateKind::Fs,
            path: root.path().to_path_buf(),
            lock_timeout: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_fs_round_trip_and_purge() {
        let root = TempDir::new().unwrap();
        let coordinator = StateCoordinator::new(fs_config(&root));
        let cluster = Cluster::new("alpha", "proj-1", "local");

        assert_eq!(coordinator.load("alpha").unwrap(), None);
        coordinator.persist(&cluster).unwrap();
        assert_eq!(coordinator.load("alpha").unwrap(), Some(cluster));

        coordinator.purge("alpha").unwrap();
        assert_eq!(coordinator.load("alpha").unwrap(), None);
        assert!(!root.path().join("alpha").exists());
    }

    #[test]
    fn test_fs_lock_is_exclusive() {
        let root = TempDir::new().unwrap();
        let coordinator = StateCoordinator::new(fs_config(&root));

        let lease = coordinator.lock("alpha").unwrap();
        assert!(lease.is_held());
        assert_eq!(lease.cluster_name(), "alpha");
        assert!(matches!(
            coordinator.lock("alpha"),
            Err(StateError::Lock(LockError::AlreadyLocked { .. }))
        ));

        drop(lease);
        assert!(coordinator.lock("alpha").is_ok());
    }

    #[test]
    fn test_memory_kind() {
        let coordinator = StateCoordinator::new(StateConfig {
            kind: StateKind::Memory,
            ..StateConfig::default()
        });
        let cluster = Cluster::new("alpha", "proj-1", "local");

        let lease = coordinator.lock("alpha").unwrap();
        assert!(matches!(
            coordinator.lock("alpha"),
            Err(StateError::Lock(LockError::Busy(_)))
        ));
        coordinator.persist(&cluster).unwrap();
        assert_eq!(coordinator.store().list().unwrap(), vec!["alpha"]);
        drop(lease);
    }

    #[test]
    fn test_lock_rejects_bad_name() {
        let root = TempDir::new().unwrap();
        let coordinator = StateCoordinator::new(fs_config(&root));

        assert!(matches!(
            coordinator.lock("../escape"),
            Err(StateError::InvalidName { .. })
        ));
    }
}
