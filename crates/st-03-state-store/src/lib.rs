//! # ST-03: State Store Subsystem
//!
//! Persists cluster documents between runs and serialises runs per cluster.
//!
//! ## Architecture
//!
//! - **Domain**: Error taxonomy and cluster name rules
//! - **Ports**: Outbound (StateStore)
//! - **Adapters**: Filesystem and in-memory stores, fs2 file lock, in-process leases
//! - **Application**: StateCoordinator
//!
//! Documents are written atomically, so a crash mid-commit leaves the
//! previous version in place.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::{ClusterLock, FsStateStore, MemoryLease, MemoryLocks, MemoryStateStore};
pub use application::StateCoordinator;
pub use config::{StateConfig, StateKind};
pub use domain::{validate_cluster_name, LockError, StateError};
pub use ports::outbound::StateStore;
