//! Error types for the Resource Graph

use shared_types::ResourceKey;
use thiserror::Error;

/// All errors that can occur while building or ordering the resource graph.
///
/// Every variant is structural: the document itself is wrong, so retrying
/// cannot help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Cycle detected in dependency graph
    #[error("Dependency cycle detected: {}", format_cycle(.members))]
    CycleDetected { members: Vec<ResourceKey> },

    /// A reference or `depends_on` entry names an undeclared resource
    #[error("Unknown dependency: {from} references undeclared resource {to}")]
    UnknownDependency { from: ResourceKey, to: ResourceKey },

    /// A resource references itself
    #[error("Resource {key} depends on itself")]
    SelfDependency { key: ResourceKey },

    /// Two nodes with the same key
    #[error("Duplicate resource key in graph: {key}")]
    DuplicateNode { key: ResourceKey },

    /// Node count exceeded limits
    #[error("Resource count exceeded: {count} > {max}")]
    TooManyNodes { count: usize, max: usize },

    /// Edge count exceeded limits
    #[error("Edge count exceeded: {count} > {max}")]
    TooManyEdges { count: usize, max: usize },
}

fn format_cycle(members: &[ResourceKey]) -> String {
    let mut path: Vec<&str> = members.iter().map(ResourceKey::as_str).collect();
    if let Some(first) = members.first() {
        path.push(first.as_str());
    }
    path.join(" -> ")
}
