//! Graph scheduler
//!
//! Runs one pass over a subset of the resource graph with a bounded number
//! of provider operations in flight. A node is dispatched only once every
//! node before it in the pass direction has completed; among ready nodes
//! the one earliest in topological order (latest, for reverse passes) goes
//! first.
//!
//! The scheduler is the only writer of the cluster document during a pass:
//! tasks return render patches and the loop commits them before releasing
//! dependents.

use crate::domain::entities::NodeOutcome;
use crate::domain::errors::{NodeFailure, ProviderError, ResourceError, StructuralError};
use crate::domain::value_objects::{Operation, RenderPatch};
use shared_types::{Cluster, ResourceKey};
use st_01_resource_graph::ResourceGraph;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Pass direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Dependencies before dependents (create, update)
    Forward,
    /// Dependents before dependencies (delete, destroy)
    Reverse,
}

/// What a finished task hands back to the loop.
#[derive(Debug)]
pub struct TaskResult {
    pub key: ResourceKey,
    /// Committed even when a later step of the node failed
    pub patch: Option<RenderPatch>,
    /// Forget the node's outputs (after deletion)
    pub clear_outputs: bool,
    pub outcome: Result<NodeOutcome, NodeFailure>,
}

impl TaskResult {
    pub fn failed(key: ResourceKey, operation: Operation, error: impl Into<ResourceError>) -> Self {
        Self {
            key: key.clone(),
            patch: None,
            clear_outputs: false,
            outcome: Err(NodeFailure::new(key, operation, error)),
        }
    }
}

pub type NodeTask = Pin<Box<dyn Future<Output = TaskResult> + Send + 'static>>;

/// Decision taken for a node when it becomes ready.
pub enum Dispatch {
    /// Completed without provider work
    Done(NodeOutcome),
    Failed(NodeFailure),
    Spawn(NodeTask),
}

/// Everything a pass did.
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// In completion order
    pub completed: Vec<(ResourceKey, NodeOutcome)>,
    pub failed: Vec<NodeFailure>,
    /// Not attempted because something they wait on failed
    pub skipped: Vec<ResourceKey>,
    /// Not attempted because the pass was interrupted
    pub pending: Vec<ResourceKey>,
    pub interrupted: bool,
}

impl PassOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }

    pub fn keys_with(&self, outcome: NodeOutcome) -> Vec<ResourceKey> {
        self.completed
            .iter()
            .filter(|(_, o)| *o == outcome)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeState {
    Waiting,
    Running,
    Done,
    Failed,
    Skipped,
}

/// True once the interrupt flag has been raised.
pub fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

pub struct Scheduler<'a> {
    graph: &'a ResourceGraph,
    direction: Direction,
    workers: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(graph: &'a ResourceGraph, direction: Direction, workers: usize) -> Self {
        Self {
            graph,
            direction,
            workers: workers.max(1),
        }
    }

    fn upstream(&self, key: &ResourceKey) -> &'a [ResourceKey] {
        match self.direction {
            Direction::Forward => self.graph.dependencies(key),
            Direction::Reverse => self.graph.dependents(key),
        }
    }

    fn downstream(&self, key: &ResourceKey) -> &'a [ResourceKey] {
        match self.direction {
            Direction::Forward => self.graph.dependents(key),
            Direction::Reverse => self.graph.dependencies(key),
        }
    }

    fn downstream_closure(&self, key: &ResourceKey) -> Vec<ResourceKey> {
        match self.direction {
            Direction::Forward => self.graph.descendants(key),
            Direction::Reverse => self.graph.ancestors(key),
        }
    }

    fn rank(&self, key: &ResourceKey) -> usize {
        let position = self.graph.position(key).unwrap_or(usize::MAX);
        match self.direction {
            Direction::Forward => position,
            Direction::Reverse => usize::MAX - position,
        }
    }

    /// Run `plan` for each member as it becomes ready.
    ///
    /// Upstream nodes outside `members` are treated as complete. On
    /// interrupt, dispatch stops and in-flight tasks are drained.
    pub async fn run<F>(
        &self,
        members: &[ResourceKey],
        document: &mut Cluster,
        cancel: &mut Option<watch::Receiver<bool>>,
        mut plan: F,
    ) -> PassOutcome
    where
        F: FnMut(&ResourceKey, &Cluster) -> Dispatch,
    {
        let member_set: HashSet<&ResourceKey> = members.iter().collect();
        let mut states: HashMap<ResourceKey, NodeState> = HashMap::new();
        let mut remaining: HashMap<ResourceKey, usize> = HashMap::new();
        let mut ready: BTreeSet<(usize, ResourceKey)> = BTreeSet::new();

        for key in members {
            let waiting_on = self
                .upstream(key)
                .iter()
                .filter(|k| member_set.contains(k))
                .count();
            states.insert(key.clone(), NodeState::Waiting);
            remaining.insert(key.clone(), waiting_on);
            if waiting_on == 0 {
                ready.insert((self.rank(key), key.clone()));
            }
        }

        let mut outcome = PassOutcome::default();
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut interrupted = is_cancelled(cancel);

        loop {
            if !interrupted && is_cancelled(cancel) {
                warn!(in_flight = tasks.len(), "Interrupt received, draining in-flight operations");
                interrupted = true;
            }

            while !interrupted && tasks.len() < self.workers {
                let Some(next) = ready.pop_first() else { break };
                let key = next.1;

                match plan(&key, document) {
                    Dispatch::Done(node_outcome) => {
                        debug!(resource = %key, ?node_outcome, "Completed without provider work");
                        states.insert(key.clone(), NodeState::Done);
                        outcome.completed.push((key.clone(), node_outcome));
                        self.release(&key, &states, &mut remaining, &mut ready);
                    }
                    Dispatch::Failed(failure) => {
                        self.fail(failure, &mut states, &mut outcome);
                    }
                    Dispatch::Spawn(task) => {
                        states.insert(key, NodeState::Running);
                        tasks.spawn(task);
                    }
                }
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok(result)) => {
                            self.commit(result, document, &mut states, &mut remaining, &mut ready, &mut outcome);
                        }
                        Some(Err(e)) => {
                            // The key is recovered below from the Running state
                            error!(error = %e, "Worker task ended without a result");
                        }
                        None => {}
                    }
                }
                changed = wait_for_change(cancel) => {
                    match changed {
                        // Checked at the top of the loop
                        Ok(()) => {}
                        Err(_) => {
                            // Sender dropped: no interrupt can arrive any more
                            *cancel = None;
                        }
                    }
                }
            }
        }

        // Tasks that panicked or were aborted never reported back
        let lost: Vec<ResourceKey> = members
            .iter()
            .filter(|k| states.get(*k) == Some(&NodeState::Running))
            .cloned()
            .collect();
        for key in lost {
            let failure = NodeFailure::new(
                key,
                Operation::Apply,
                ProviderError::Transient {
                    operation: "worker".into(),
                    message: "task ended without a result".into(),
                },
            );
            self.fail(failure, &mut states, &mut outcome);
        }

        outcome.interrupted = interrupted;
        outcome.pending = members
            .iter()
            .filter(|k| states.get(*k) == Some(&NodeState::Waiting))
            .cloned()
            .collect();
        outcome
    }

    fn commit(
        &self,
        result: TaskResult,
        document: &mut Cluster,
        states: &mut HashMap<ResourceKey, NodeState>,
        remaining: &mut HashMap<ResourceKey, usize>,
        ready: &mut BTreeSet<(usize, ResourceKey)>,
        outcome: &mut PassOutcome,
    ) {
        let TaskResult {
            key,
            patch,
            clear_outputs,
            outcome: node_outcome,
        } = result;

        let mut committed = Ok(());
        if let Some(patch) = patch {
            committed = document.render(&patch.key, patch.outputs);
        }
        if clear_outputs {
            committed = committed.and_then(|_| document.clear_outputs(&key));
        }

        let node_outcome = match (node_outcome, committed) {
            (Ok(node_outcome), Ok(())) => Ok(node_outcome),
            (Ok(_), Err(e)) => Err(NodeFailure::new(
                key.clone(),
                Operation::Render,
                StructuralError::from(e),
            )),
            (Err(failure), _) => Err(failure),
        };

        match node_outcome {
            Ok(node_outcome) => {
                states.insert(key.clone(), NodeState::Done);
                outcome.completed.push((key.clone(), node_outcome));
                self.release(&key, states, remaining, ready);
            }
            Err(failure) => self.fail(failure, states, outcome),
        }
    }

    fn release(
        &self,
        key: &ResourceKey,
        states: &HashMap<ResourceKey, NodeState>,
        remaining: &mut HashMap<ResourceKey, usize>,
        ready: &mut BTreeSet<(usize, ResourceKey)>,
    ) {
        for next in self.downstream(key) {
            if states.get(next) != Some(&NodeState::Waiting) {
                continue;
            }
            if let Some(count) = remaining.get_mut(next) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert((self.rank(next), next.clone()));
                }
            }
        }
    }

    fn fail(&self, failure: NodeFailure, states: &mut HashMap<ResourceKey, NodeState>, outcome: &mut PassOutcome) {
        error!(resource = %failure.key, operation = %failure.operation, error = %failure.error, "Node failed");
        states.insert(failure.key.clone(), NodeState::Failed);

        for blocked in self.downstream_closure(&failure.key) {
            if let Some(state) = states.get_mut(&blocked) {
                if *state == NodeState::Waiting {
                    warn!(resource = %blocked, cause = %failure.key, "Skipped");
                    *state = NodeState::Skipped;
                    outcome.skipped.push(blocked);
                }
            }
        }
        outcome.failed.push(failure);
    }
}

async fn wait_for_change(
    cancel: &mut Option<watch::Receiver<bool>>,
) -> Result<(), watch::error::RecvError> {
    match cancel.as_mut() {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}
