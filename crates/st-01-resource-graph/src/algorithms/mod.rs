//! Algorithms module for the Resource Graph
//!
//! Contains:
//! - Dependency graph builder
//! - Kahn's topological sort with cycle extraction

pub mod dependency_builder;
pub mod kahns;

pub use dependency_builder::build_dependency_graph;
pub use kahns::kahns_topological_sort;
