//! Domain invariants for the Resource Graph
//!
//! Checked by the service in debug builds and by the property tests.

use super::entities::{DependencyGraph, ParallelGroup, Schedule};
use shared_types::ResourceKey;
use std::collections::{HashMap, HashSet};

/// Topological order: for every edge A -> B, A appears before B.
pub fn invariant_topological_order(schedule: &Schedule, graph: &DependencyGraph) -> bool {
    let positions: HashMap<&ResourceKey, usize> = schedule
        .order
        .iter()
        .enumerate()
        .map(|(i, k)| (k, i))
        .collect();

    graph.edges.iter().all(|edge| {
        match (positions.get(&edge.from), positions.get(&edge.to)) {
            (Some(from), Some(to)) => from < to,
            _ => false,
        }
    })
}

/// No cycles: the graph is a DAG.
pub fn invariant_no_cycles(graph: &DependencyGraph) -> bool {
    let mut visited = HashSet::new();
    let mut stack = HashSet::new();

    graph
        .nodes
        .iter()
        .all(|node| !has_cycle_dfs(graph, &node.key, &mut visited, &mut stack))
}

fn has_cycle_dfs<'a>(
    graph: &'a DependencyGraph,
    node: &'a ResourceKey,
    visited: &mut HashSet<&'a ResourceKey>,
    stack: &mut HashSet<&'a ResourceKey>,
) -> bool {
    if stack.contains(node) {
        return true;
    }
    if !visited.insert(node) {
        return false;
    }

    stack.insert(node);
    for neighbor in graph.dependents(node) {
        if has_cycle_dfs(graph, neighbor, visited, stack) {
            return true;
        }
    }
    stack.remove(node);
    false
}

/// Parallel safety: no edge joins two members of the same level.
pub fn invariant_parallel_safety(group: &ParallelGroup, graph: &DependencyGraph) -> bool {
    for (i, a) in group.resources.iter().enumerate() {
        for b in &group.resources[i + 1..] {
            if graph.has_edge(a, b) || graph.has_edge(b, a) {
                return false;
            }
        }
    }
    true
}

/// Completeness: every node is scheduled exactly once, in both the flat
/// order and the levels.
pub fn invariant_completeness(schedule: &Schedule, graph: &DependencyGraph) -> bool {
    let all: HashSet<&ResourceKey> = graph.nodes.iter().map(|n| &n.key).collect();

    let ordered: HashSet<&ResourceKey> = schedule.order.iter().collect();
    if ordered.len() != schedule.order.len() || ordered != all {
        return false;
    }

    let leveled: Vec<&ResourceKey> = schedule
        .levels
        .iter()
        .flat_map(|g| g.resources.iter())
        .collect();
    let leveled_set: HashSet<&ResourceKey> = leveled.iter().copied().collect();

    leveled.len() == leveled_set.len() && leveled_set == all
}
