//! Adapters: cloud provider implementations and per-kind resource adapters.

pub mod cloud;
pub mod resources;

pub use cloud::{FileBackedCloud, InMemoryCloud};
pub use resources::{AdapterRegistry, ProviderClient, ResourceAdapter};
