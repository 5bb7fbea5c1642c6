//! Outbound Ports (Driven Ports / SPI)

use crate::domain::StateError;
use shared_types::Cluster;

/// Durable storage for cluster documents, keyed by cluster name.
///
/// `commit` replaces the whole document; readers never observe a partial
/// write.
pub trait StateStore: Send + Sync {
    fn exists(&self, name: &str) -> Result<bool, StateError>;

    /// `StateError::NotFound` when nothing was committed under `name`.
    fn load(&self, name: &str) -> Result<Cluster, StateError>;

    fn commit(&self, cluster: &Cluster) -> Result<(), StateError>;

    /// Remove the stored document; removing a missing one is not an error.
    fn destroy(&self, name: &str) -> Result<(), StateError>;

    /// Names of every stored cluster, sorted.
    fn list(&self) -> Result<Vec<String>, StateError>;
}
