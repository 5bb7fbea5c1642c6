//! Error taxonomy for convergence
//!
//! - `ProviderError`: what the cloud said. Only `Transient` is retried.
//! - `StructuralError`: the document is wrong. Never retried.
//! - `ResourceError`: either of the above, raised by one adapter operation.
//! - `ReconcileError`: what a run returns to its caller.

use super::value_objects::Operation;
use crate::domain::entities::Phase;
use shared_types::{AttrRef, Cluster, ClusterError, ResourceKey, ResourceKind};
use st_01_resource_graph::GraphError;
use thiserror::Error;

/// Errors reported by a cloud provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("transient failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    #[error("permission denied during {operation}: {message}")]
    PermissionDenied { operation: String, message: String },

    #[error("provider rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }
}

/// Malformed declarations and documents. Fatal, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("{key}: missing required attribute '{attribute}'")]
    MissingAttribute { key: ResourceKey, attribute: String },

    #[error("{key}: invalid attribute '{attribute}': {reason}")]
    InvalidAttribute {
        key: ResourceKey,
        attribute: String,
        reason: String,
    },

    #[error("{key}: reference {reference} names an output {target_kind} does not render")]
    UnknownOutput {
        key: ResourceKey,
        reference: AttrRef,
        target_kind: ResourceKind,
    },

    #[error("{absent} is declared absent but {dependent} still depends on it")]
    AbsentDependency {
        absent: ResourceKey,
        dependent: ResourceKey,
    },

    #[error("{key}: {kind} '{name}' already exists and belongs to {owner}")]
    ForeignObject {
        key: ResourceKey,
        kind: ResourceKind,
        name: String,
        owner: String,
    },

    #[error("{key}: {kind} adapter has no provider id to act on")]
    MissingProviderId { key: ResourceKey, kind: ResourceKind },

    #[error("invalid override '{assignment}': {reason}")]
    InvalidOverride { assignment: String, reason: String },

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Error from one adapter operation on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

impl ResourceError {
    pub fn is_permission_denied(&self) -> bool {
        match self {
            ResourceError::Provider(ProviderError::PermissionDenied { .. }) => true,
            ResourceError::Provider(ProviderError::RetriesExhausted { last, .. }) => {
                matches!(**last, ProviderError::PermissionDenied { .. })
            }
            _ => false,
        }
    }
}

/// A node that failed during reconcile or destroy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key} ({operation}): {error}")]
pub struct NodeFailure {
    pub key: ResourceKey,
    pub operation: Operation,
    pub error: ResourceError,
}

impl NodeFailure {
    pub fn new(key: ResourceKey, operation: Operation, error: impl Into<ResourceError>) -> Self {
        Self {
            key,
            operation,
            error: error.into(),
        }
    }
}

/// Result of a failed or incomplete run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Fails fast before any provider mutation.
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    /// Observation failed; nothing was mutated.
    #[error("observing {key}: {source}")]
    Observe {
        key: ResourceKey,
        source: ResourceError,
    },

    #[error("provider authentication failed: {0}")]
    Authentication(ProviderError),

    #[error("run lock for cluster '{cluster}' is not held")]
    LockNotHeld { cluster: String },

    #[error("cannot {operation} while in phase {phase:?}")]
    InvalidTransition {
        phase: Phase,
        operation: &'static str,
    },

    /// Some nodes failed; the document holds everything that did converge.
    #[error("partial convergence of '{}': {} failed, {} skipped", .cluster.name, .failed.len(), .skipped.len())]
    PartialConvergence {
        failed: Vec<NodeFailure>,
        skipped: Vec<ResourceKey>,
        cluster: Box<Cluster>,
    },

    /// Stopped by an external interrupt after draining in-flight work.
    #[error("run of '{}' interrupted with {} resources pending", .cluster.name, .pending.len())]
    Interrupted {
        pending: Vec<ResourceKey>,
        cluster: Box<Cluster>,
    },
}

impl ReconcileError {
    /// The partially converged document, when the run got far enough to
    /// mutate anything.
    pub fn partial_cluster(&self) -> Option<&Cluster> {
        match self {
            ReconcileError::PartialConvergence { cluster, .. }
            | ReconcileError::Interrupted { cluster, .. } => Some(cluster),
            _ => None,
        }
    }

    pub fn into_partial_cluster(self) -> Option<Cluster> {
        match self {
            ReconcileError::PartialConvergence { cluster, .. }
            | ReconcileError::Interrupted { cluster, .. } => Some(*cluster),
            _ => None,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, ReconcileError::Structural(_))
    }
}

impl From<GraphError> for ReconcileError {
    fn from(e: GraphError) -> Self {
        ReconcileError::Structural(StructuralError::Graph(e))
    }
}

impl From<ClusterError> for ReconcileError {
    fn from(e: ClusterError) -> Self {
        ReconcileError::Structural(StructuralError::Cluster(e))
    }
}
