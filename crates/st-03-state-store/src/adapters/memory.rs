//! In-memory state store for tests and throwaway runs.

use crate::domain::{validate_cluster_name, StateError};
use crate::ports::outbound::StateStore;
use parking_lot::RwLock;
use shared_types::Cluster;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryStateStore {
    clusters: RwLock<BTreeMap<String, Cluster>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn exists(&self, name: &str) -> Result<bool, StateError> {
        Ok(self.clusters.read().contains_key(name))
    }

    fn load(&self, name: &str) -> Result<Cluster, StateError> {
        self.clusters
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StateError::NotFound(name.to_string()))
    }

    fn commit(&self, cluster: &Cluster) -> Result<(), StateError> {
        validate_cluster_name(&cluster.name)?;
        self.clusters
            .write()
            .insert(cluster.name.clone(), cluster.clone());
        Ok(())
    }

    fn destroy(&self, name: &str) -> Result<(), StateError> {
        self.clusters.write().remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StateError> {
        Ok(self.clusters.read().keys().cloned().collect())
    }
}
