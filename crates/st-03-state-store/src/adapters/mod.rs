//! State store adapters: filesystem and in-memory stores, run locks.

pub mod fs;
pub mod lock;
pub mod memory;

pub use fs::FsStateStore;
pub use lock::{ClusterLock, MemoryLease, MemoryLocks};
pub use memory::MemoryStateStore;
