//! Inbound Ports (Driving Ports / API)

use crate::domain::entities::{DependencyGraph, ResourceGraph, Schedule};
use crate::domain::errors::GraphError;
use shared_types::Cluster;

/// Primary Resource Graph API
pub trait ResourceGraphApi: Send + Sync {
    /// Build, check and order the graph of a cluster document.
    ///
    /// This is the main entry point. It:
    /// 1. Builds the dependency graph
    /// 2. Checks size limits
    /// 3. Performs topological sort (fails naming a cycle)
    fn build(&self, cluster: &Cluster) -> Result<ResourceGraph, GraphError>;

    /// Build the unordered dependency graph only.
    fn build_dependency_graph(&self, cluster: &Cluster) -> Result<DependencyGraph, GraphError>;

    /// Order an existing dependency graph.
    fn schedule(&self, graph: &DependencyGraph) -> Result<Schedule, GraphError>;
}
