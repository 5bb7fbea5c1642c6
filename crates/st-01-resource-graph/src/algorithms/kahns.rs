//! Kahn's Topological Sort Algorithm
//!
//! O((V + E) log V): the ready set is a min-heap on declaration index so
//! that the order is deterministic and stable against document order.

use crate::domain::entities::{DependencyGraph, ParallelGroup, Schedule};
use crate::domain::errors::GraphError;
use shared_types::ResourceKey;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Perform Kahn's topological sort on the dependency graph.
///
/// Returns the flat order (dependencies first, ties broken by declaration
/// order) plus depth levels. When the graph has a cycle, one concrete cycle
/// is extracted from the unsorted remainder and reported by name.
pub fn kahns_topological_sort(graph: &DependencyGraph) -> Result<Schedule, GraphError> {
    if graph.nodes.is_empty() {
        return Ok(Schedule::default());
    }

    let index: HashMap<&ResourceKey, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (&n.key, i))
        .collect();

    // 1. Copy in-degree per node index (we'll modify it)
    let mut in_degree: Vec<usize> = graph
        .nodes
        .iter()
        .map(|n| graph.dependencies(&n.key).len())
        .collect();

    // 2. Seed the ready set with every root
    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = graph
        .nodes
        .iter()
        .enumerate()
        .filter(|(i, _)| in_degree[*i] == 0)
        .map(|(i, n)| Reverse((n.declared_at, i)))
        .collect();

    let mut order: Vec<usize> = Vec::with_capacity(graph.nodes.len());
    let mut level: Vec<usize> = vec![0; graph.nodes.len()];

    // 3. Pop the earliest-declared ready node, release its dependents
    while let Some(Reverse((_, current))) = ready.pop() {
        order.push(current);

        for dependent in graph.dependents(&graph.nodes[current].key) {
            let Some(&next) = index.get(dependent) else {
                continue;
            };
            level[next] = level[next].max(level[current] + 1);
            in_degree[next] = in_degree[next].saturating_sub(1);
            if in_degree[next] == 0 {
                ready.push(Reverse((graph.nodes[next].declared_at, next)));
            }
        }
    }

    // 4. Anything left over sits on or behind a cycle
    if order.len() < graph.nodes.len() {
        let members = extract_cycle(graph, &index, &in_degree);
        return Err(GraphError::CycleDetected { members });
    }

    // 5. Group by depth; members keep declaration order
    let depth = level.iter().copied().max().unwrap_or(0);
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); depth + 1];
    for &i in &order {
        buckets[level[i]].push(i);
    }

    let levels = buckets
        .into_iter()
        .enumerate()
        .map(|(lvl, mut members)| {
            members.sort_by_key(|&i| graph.nodes[i].declared_at);
            ParallelGroup::new(
                lvl,
                members
                    .into_iter()
                    .map(|i| graph.nodes[i].key.clone())
                    .collect(),
            )
        })
        .collect();

    Ok(Schedule {
        order: order
            .into_iter()
            .map(|i| graph.nodes[i].key.clone())
            .collect(),
        levels,
    })
}

/// Walk backwards through unsorted predecessors until a node repeats.
///
/// Every unsorted node keeps at least one unsorted predecessor, so the walk
/// always closes a loop. The loop is returned in edge direction, rotated to
/// start at its earliest-declared member.
fn extract_cycle(
    graph: &DependencyGraph,
    index: &HashMap<&ResourceKey, usize>,
    in_degree: &[usize],
) -> Vec<ResourceKey> {
    let residual = |i: usize| in_degree[i] > 0;

    let Some(start) = (0..graph.nodes.len())
        .filter(|&i| residual(i))
        .min_by_key(|&i| graph.nodes[i].declared_at)
    else {
        return Vec::new();
    };

    let mut path: Vec<usize> = vec![start];
    let mut seen_at: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;

    loop {
        let previous = graph
            .dependencies(&graph.nodes[current].key)
            .iter()
            .filter_map(|k| index.get(k).copied())
            .filter(|&i| residual(i))
            .min_by_key(|&i| graph.nodes[i].declared_at);

        let Some(previous) = previous else {
            break;
        };
        if let Some(&at) = seen_at.get(&previous) {
            path.drain(..at);
            break;
        }
        seen_at.insert(previous, path.len());
        path.push(previous);
        current = previous;
    }

    path.reverse();
    if let Some(first) = path
        .iter()
        .enumerate()
        .min_by_key(|(_, &i)| graph.nodes[i].declared_at)
        .map(|(pos, _)| pos)
    {
        path.rotate_left(first);
    }

    path.into_iter()
        .map(|i| graph.nodes[i].key.clone())
        .collect()
}
