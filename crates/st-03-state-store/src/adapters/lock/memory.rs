//! In-process leases for the memory state store.

use crate::domain::LockError;
use parking_lot::Mutex;
use st_02_convergence::RunLease;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Set of cluster names leased in this process.
#[derive(Clone, Default)]
pub struct MemoryLocks {
    held: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails immediately when the name is already leased.
    pub fn acquire(&self, cluster: &str) -> Result<MemoryLease, LockError> {
        if !self.held.lock().insert(cluster.to_string()) {
            return Err(LockError::Busy(cluster.to_string()));
        }
        Ok(MemoryLease {
            cluster: cluster.to_string(),
            held: Arc::clone(&self.held),
        })
    }
}

/// Released on drop.
pub struct MemoryLease {
    cluster: String,
    held: Arc<Mutex<BTreeSet<String>>>,
}

impl RunLease for MemoryLease {
    fn cluster_name(&self) -> &str {
        &self.cluster
    }

    fn is_held(&self) -> bool {
        self.held.lock().contains(&self.cluster)
    }
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        self.held.lock().remove(&self.cluster);
    }
}
