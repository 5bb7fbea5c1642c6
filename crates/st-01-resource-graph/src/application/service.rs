//! Resource Graph Service
//!
//! Main service implementing ResourceGraphApi.

use crate::algorithms::{build_dependency_graph, kahns_topological_sort};
use crate::config::GraphConfig;
use crate::domain::entities::{DependencyGraph, ResourceGraph, Schedule};
use crate::domain::errors::GraphError;
use crate::domain::invariants;
use crate::ports::inbound::ResourceGraphApi;
use shared_types::Cluster;

use tracing::{debug, info, warn};

/// Resource Graph Service
///
/// Orchestrates the graph pipeline:
/// 1. Validate document size
/// 2. Build dependency graph
/// 3. Check edge limit
/// 4. Execute Kahn's algorithm
/// 5. Return the ordered graph
pub struct ResourceGraphService {
    config: GraphConfig,
}

impl ResourceGraphService {
    /// Create a new service with default config
    pub fn new() -> Self {
        Self {
            config: GraphConfig::default(),
        }
    }

    /// Create a new service with custom config
    pub fn with_config(config: GraphConfig) -> Self {
        Self { config }
    }

    fn validate_size(&self, cluster: &Cluster) -> Result<(), GraphError> {
        if cluster.resources.len() > self.config.max_nodes {
            return Err(GraphError::TooManyNodes {
                count: cluster.resources.len(),
                max: self.config.max_nodes,
            });
        }
        Ok(())
    }
}

impl Default for ResourceGraphService {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGraphApi for ResourceGraphService {
    fn build(&self, cluster: &Cluster) -> Result<ResourceGraph, GraphError> {
        self.validate_size(cluster)?;

        let graph = self.build_dependency_graph(cluster)?;
        debug!(
            cluster = %cluster.name,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "[st-01] Dependency graph built"
        );

        let schedule = match self.schedule(&graph) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(cluster = %cluster.name, error = %e, "[st-01] Graph rejected");
                return Err(e);
            }
        };

        debug_assert!(invariants::invariant_topological_order(&schedule, &graph));
        debug_assert!(invariants::invariant_completeness(&schedule, &graph));

        info!(
            cluster = %cluster.name,
            resources = schedule.order.len(),
            levels = schedule.levels.len(),
            max_parallelism = schedule.max_parallelism(),
            "[st-01] Resource graph ordered"
        );

        Ok(ResourceGraph::new(graph, schedule))
    }

    fn build_dependency_graph(&self, cluster: &Cluster) -> Result<DependencyGraph, GraphError> {
        let graph = build_dependency_graph(cluster)?;

        if graph.edge_count() > self.config.max_edges {
            return Err(GraphError::TooManyEdges {
                count: graph.edge_count(),
                max: self.config.max_edges,
            });
        }

        Ok(graph)
    }

    fn schedule(&self, graph: &DependencyGraph) -> Result<Schedule, GraphError> {
        kahns_topological_sort(graph)
    }
}

/// Build an ordered graph with default limits.
pub fn build_resource_graph(cluster: &Cluster) -> Result<ResourceGraph, GraphError> {
    ResourceGraphService::new().build(cluster)
}
