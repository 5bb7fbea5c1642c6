//! Cloud provider adapters

pub mod file;
pub mod memory;

pub use file::FileBackedCloud;
pub use memory::{CloudOp, Fault, FaultKind, InMemoryCloud, Inventory, JournalEntry};
