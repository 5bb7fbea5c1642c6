//! Domain module for convergence
//!
//! Contains snapshots, verdicts, reports and the error taxonomy.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use value_objects::*;
