//! Application layer for the state store

pub mod coordinator;

pub use coordinator::StateCoordinator;
