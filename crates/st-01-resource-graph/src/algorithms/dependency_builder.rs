//! Dependency Graph Builder
//!
//! Builds the dependency graph from a cluster document. Edges come from two
//! places:
//! 1. Attribute references: the dependent reads a rendered output
//! 2. `depends_on`: ordering-only dependencies

use crate::domain::entities::{Dependency, DependencyGraph, GraphNode};
use crate::domain::errors::GraphError;
use crate::domain::value_objects::DependencyKind;
use shared_types::Cluster;

/// Build a dependency graph from every declaration in `cluster`.
///
/// Fails on duplicate keys, self references and references to undeclared
/// resources. Cycles are not detected here; see `kahns_topological_sort`.
pub fn build_dependency_graph(cluster: &Cluster) -> Result<DependencyGraph, GraphError> {
    let mut graph = DependencyGraph::new();

    for (index, decl) in cluster.resources.iter().enumerate() {
        if !graph.add_node(GraphNode::from_decl(index, decl)) {
            return Err(GraphError::DuplicateNode {
                key: decl.key.clone(),
            });
        }
    }

    for decl in &cluster.resources {
        let referenced = decl.references().into_iter().map(|r| {
            (
                &r.key,
                DependencyKind::AttributeRef {
                    field: r.field.clone(),
                },
            )
        });
        let explicit = decl
            .depends_on
            .iter()
            .map(|key| (key, DependencyKind::Explicit));

        for (target, kind) in referenced.chain(explicit) {
            if *target == decl.key {
                return Err(GraphError::SelfDependency {
                    key: decl.key.clone(),
                });
            }
            if !graph.contains(target) {
                return Err(GraphError::UnknownDependency {
                    from: decl.key.clone(),
                    to: target.clone(),
                });
            }
            graph.add_edge(Dependency::new(target.clone(), decl.key.clone(), kind));
        }
    }

    Ok(graph)
}
