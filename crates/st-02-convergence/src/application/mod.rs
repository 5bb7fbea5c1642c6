//! Application layer for convergence
//!
//! The engine drives the phases; the scheduler runs one dependency-ordered
//! pass with bounded concurrency.

pub mod engine;
pub mod scheduler;

pub use engine::{ConvergenceEngine, RunOutcome};
pub use scheduler::{Direction, PassOutcome, Scheduler};
