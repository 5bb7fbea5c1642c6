//! Core entities for convergence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{Attributes, Cluster, ResourceKey, ResourceKind, TagSet};
use std::collections::BTreeMap;

/// One resource as seen by an adapter, either observed or declared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub key: ResourceKey,
    pub kind: ResourceKind,
    /// Provider-side name, unique per kind (`<cluster>-<name>`)
    pub name: String,
    pub provider_id: Option<String>,
    /// Comparable attributes
    pub attributes: Attributes,
    /// Rendered outputs (`id` plus kind-specific values)
    pub outputs: Attributes,
    /// Fields only the provider knows (timestamps, status); never diffed
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub provider_only: Attributes,
    #[serde(default, skip_serializing_if = "TagSet::is_empty")]
    pub tags: TagSet,
}

impl ResourceState {
    pub fn new(key: ResourceKey, kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            name: name.into(),
            provider_id: None,
            attributes: Attributes::new(),
            outputs: Attributes::new(),
            provider_only: Attributes::new(),
            tags: TagSet::new(),
        }
    }

    /// True when no attribute still holds a reference.
    pub fn is_resolved(&self) -> bool {
        self.attributes.values().all(|v| v.is_resolved())
    }
}

/// Observed state of one resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "observed", content = "state", rename_all = "snake_case")]
pub enum Observed {
    NotFound,
    Found(ResourceState),
}

impl Observed {
    pub fn state(&self) -> Option<&ResourceState> {
        match self {
            Observed::Found(state) => Some(state),
            Observed::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Observed::Found(_))
    }
}

/// Observed state of every declared resource.
pub type ActualSnapshot = BTreeMap<ResourceKey, Observed>;

/// Desired state of every declared resource; `None` for absent declarations.
pub type ExpectedSnapshot = BTreeMap<ResourceKey, Option<ResourceState>>;

/// An object as the cloud provider stores it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderObject {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub attributes: Attributes,
    #[serde(default)]
    pub tags: TagSet,
    pub created_at: DateTime<Utc>,
}

/// Engine state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Constructed, `init` not yet called
    Uninitialized,
    Init,
    ActualGathered,
    ExpectedGathered,
    Reconciling,
    Converged,
    Destroying,
    Destroyed,
    /// A run ended partially or was interrupted; start a new engine to resume
    Failed,
}

/// What happened to one node during a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOutcome {
    Created,
    Updated,
    Replaced,
    Unchanged,
    Deleted,
}

/// Result of a fully converged reconcile.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceReport {
    pub cluster: Cluster,
    pub created: Vec<ResourceKey>,
    /// Updated in place or replaced
    pub updated: Vec<ResourceKey>,
    pub deleted: Vec<ResourceKey>,
    pub unchanged: Vec<ResourceKey>,
}

impl ConvergenceReport {
    /// True when the run made no change at all.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Result of a complete destroy.
#[derive(Clone, Debug, PartialEq)]
pub struct DestroyReport {
    pub cluster: Cluster,
    pub deleted: Vec<ResourceKey>,
    /// Declared but not found during observation; nothing to delete
    pub already_gone: Vec<ResourceKey>,
}
