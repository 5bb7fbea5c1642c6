//! # Cluster Run Locking
//!
//! One run per cluster at a time. The engine refuses to start without a
//! lease, so every run goes through one of these.
//!
//! ## Modules
//!
//! - `flock`: file lock under the state root, for the filesystem store
//! - `memory`: in-process leases, for the memory store
//! - `security`: timeouts and lock path checks

mod flock;
mod memory;
pub mod security;

pub use flock::ClusterLock;
pub use memory::{MemoryLease, MemoryLocks};
