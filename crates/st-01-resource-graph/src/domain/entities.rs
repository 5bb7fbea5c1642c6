//! Core entities for the Resource Graph

use super::value_objects::DependencyKind;
use serde::{Deserialize, Serialize};
use shared_types::{ResourceDecl, ResourceKey, ResourceKind};
use std::collections::{HashMap, HashSet, VecDeque};

/// A declared resource as a graph node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub key: ResourceKey,
    pub kind: ResourceKind,
    /// Position in the cluster document (tie breaker for ordering)
    pub declared_at: usize,
    /// Declared `ensure: absent`
    pub absent: bool,
}

impl GraphNode {
    pub fn from_decl(declared_at: usize, decl: &ResourceDecl) -> Self {
        Self {
            key: decl.key.clone(),
            kind: decl.kind,
            declared_at,
            absent: decl.is_absent(),
        }
    }
}

/// Dependency graph edge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Resource that must exist first
    pub from: ResourceKey,
    /// Resource that depends on `from`
    pub to: ResourceKey,
    /// Type of dependency
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn new(from: ResourceKey, to: ResourceKey, kind: DependencyKind) -> Self {
        Self { from, to, kind }
    }
}

/// Unordered dependency graph, as produced by the builder
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in declaration order
    pub nodes: Vec<GraphNode>,
    /// All edges (dependencies)
    pub edges: Vec<Dependency>,
    /// Adjacency list: dependency -> [dependent, ...]
    pub adjacency: HashMap<ResourceKey, Vec<ResourceKey>>,
    /// Reverse adjacency: dependent -> [dependency, ...]
    pub reverse: HashMap<ResourceKey, Vec<ResourceKey>>,
    /// In-degree count for each node
    pub in_degree: HashMap<ResourceKey, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; returns false when the key already exists.
    pub fn add_node(&mut self, node: GraphNode) -> bool {
        if self.in_degree.contains_key(&node.key) {
            return false;
        }
        self.adjacency.entry(node.key.clone()).or_default();
        self.reverse.entry(node.key.clone()).or_default();
        self.in_degree.insert(node.key.clone(), 0);
        self.nodes.push(node);
        true
    }

    /// Add a dependency edge; parallel edges are collapsed into the first.
    pub fn add_edge(&mut self, dep: Dependency) {
        if self.has_edge(&dep.from, &dep.to) {
            return;
        }

        self.adjacency
            .entry(dep.from.clone())
            .or_default()
            .push(dep.to.clone());
        self.reverse
            .entry(dep.to.clone())
            .or_default()
            .push(dep.from.clone());

        *self.in_degree.entry(dep.to.clone()).or_insert(0) += 1;

        self.edges.push(dep);
    }

    /// Check if an edge exists from -> to
    pub fn has_edge(&self, from: &ResourceKey, to: &ResourceKey) -> bool {
        self.adjacency
            .get(from)
            .map(|neighbors| neighbors.contains(to))
            .unwrap_or(false)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.in_degree.contains_key(key)
    }

    pub fn node(&self, key: &ResourceKey) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.key == key)
    }

    /// Direct dependents of `key`
    pub fn dependents(&self, key: &ResourceKey) -> &[ResourceKey] {
        self.adjacency.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependencies of `key`
    pub fn dependencies(&self, key: &ResourceKey) -> &[ResourceKey] {
        self.reverse.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Resources with no dependency on each other at the same depth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelGroup {
    /// Depth in the graph (0 = no dependencies)
    pub level: usize,
    /// Resources in this group, in declaration order
    pub resources: Vec<ResourceKey>,
}

impl ParallelGroup {
    pub fn new(level: usize, resources: Vec<ResourceKey>) -> Self {
        Self { level, resources }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Deterministic topological order plus depth levels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Flat order; ties broken by declaration order
    pub order: Vec<ResourceKey>,
    /// Depth levels, for reporting and parallelism estimates
    pub levels: Vec<ParallelGroup>,
}

impl Schedule {
    pub fn max_parallelism(&self) -> usize {
        self.levels.iter().map(ParallelGroup::len).max().unwrap_or(0)
    }
}

/// A validated, acyclic, ordered resource graph.
///
/// Only produced by the graph service; holding one is proof that the
/// document's dependencies form a DAG.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    graph: DependencyGraph,
    schedule: Schedule,
    positions: HashMap<ResourceKey, usize>,
}

impl ResourceGraph {
    pub(crate) fn new(graph: DependencyGraph, schedule: Schedule) -> Self {
        let positions = schedule
            .order
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i))
            .collect();
        Self {
            graph,
            schedule,
            positions,
        }
    }

    /// Topological order (dependencies first)
    pub fn order(&self) -> &[ResourceKey] {
        &self.schedule.order
    }

    /// Reverse topological order (dependents first)
    pub fn reverse_order(&self) -> Vec<ResourceKey> {
        self.schedule.order.iter().rev().cloned().collect()
    }

    pub fn levels(&self) -> &[ParallelGroup] {
        &self.schedule.levels
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Position of `key` in the topological order
    pub fn position(&self, key: &ResourceKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn node(&self, key: &ResourceKey) -> Option<&GraphNode> {
        self.graph.node(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn dependencies(&self, key: &ResourceKey) -> &[ResourceKey] {
        self.graph.dependencies(key)
    }

    pub fn dependents(&self, key: &ResourceKey) -> &[ResourceKey] {
        self.graph.dependents(key)
    }

    pub fn has_edge(&self, from: &ResourceKey, to: &ResourceKey) -> bool {
        self.graph.has_edge(from, to)
    }

    /// Every resource that transitively depends on `key`
    pub fn descendants(&self, key: &ResourceKey) -> Vec<ResourceKey> {
        self.walk(key, |k| self.graph.dependents(k))
    }

    /// Every resource `key` transitively depends on
    pub fn ancestors(&self, key: &ResourceKey) -> Vec<ResourceKey> {
        self.walk(key, |k| self.graph.dependencies(k))
    }

    fn walk<'a, F>(&'a self, start: &ResourceKey, next: F) -> Vec<ResourceKey>
    where
        F: Fn(&ResourceKey) -> &'a [ResourceKey],
    {
        let mut seen: HashSet<ResourceKey> = HashSet::new();
        let mut queue: VecDeque<&ResourceKey> = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            for neighbor in next(current) {
                if seen.insert(neighbor.clone()) {
                    queue.push_back(neighbor);
                }
            }
        }

        let mut found: Vec<ResourceKey> = seen.into_iter().collect();
        found.sort_by_key(|k| self.position(k).unwrap_or(usize::MAX));
        found
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
