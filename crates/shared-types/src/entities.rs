//! # Cluster Document Entities
//!
//! The cluster document is the serialized, declared topology of one logical
//! cluster plus the outputs rendered into it by previous reconciliation runs.
//!
//! ## Sections
//!
//! - **Identity**: `name`, `cloud_id`, `profile`
//! - **Provider config**: cluster-wide settings (`provider_config`)
//! - **Resources**: ordered declarations; order is the tie breaker for
//!   apply ordering, so it is preserved exactly as written
//! - **Outputs**: per-resource rendered identifiers (`ResourceDecl::outputs`)

use crate::attributes::{AttrRef, AttrValue, Attributes, ID_FIELD};
use crate::errors::ClusterError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// =============================================================================
// IDENTITY
// =============================================================================

/// Stable key of a resource within its cluster, e.g. `subnet/public-a`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name part after the kind prefix (`subnet/public-a` -> `public-a`).
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&ResourceKey> for ResourceKey {
    fn from(k: &ResourceKey) -> Self {
        k.clone()
    }
}

/// Infrastructure object kinds the engine knows how to converge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Subnet,
    Firewall,
    ComputePool,
    LoadBalancer,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Network,
        ResourceKind::Subnet,
        ResourceKind::Firewall,
        ResourceKind::ComputePool,
        ResourceKind::LoadBalancer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Firewall => "firewall",
            ResourceKind::ComputePool => "compute_pool",
            ResourceKind::LoadBalancer => "load_balancer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a declaration should exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ensure {
    #[default]
    Present,
    /// Declared for removal: no expected state, deleted if it exists.
    Absent,
}

/// Server group role of a compute pool, used to scope overrides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolRole {
    Master,
    Node,
}

impl PoolRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "master" => Some(PoolRole::Master),
            "node" => Some(PoolRole::Node),
            _ => None,
        }
    }
}

// =============================================================================
// DECLARATIONS
// =============================================================================

/// One declared infrastructure resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub key: ResourceKey,
    pub kind: ResourceKind,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub attributes: Attributes,
    /// Ordering-only dependencies that no attribute references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ResourceKey>,
    /// Rendered provider outputs; written only through `Cluster::render`.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub outputs: Attributes,
}

impl ResourceDecl {
    pub fn new(key: impl Into<ResourceKey>, kind: ResourceKind) -> Self {
        Self {
            key: key.into(),
            kind,
            ensure: Ensure::Present,
            attributes: Attributes::new(),
            depends_on: Vec::new(),
            outputs: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_dependency(mut self, key: impl Into<ResourceKey>) -> Self {
        self.depends_on.push(key.into());
        self
    }

    pub fn absent(mut self) -> Self {
        self.ensure = Ensure::Absent;
        self
    }

    pub fn is_absent(&self) -> bool {
        self.ensure == Ensure::Absent
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Provider id rendered by a previous run, if any.
    pub fn provider_id(&self) -> Option<&str> {
        self.outputs.get(ID_FIELD).and_then(AttrValue::as_str)
    }

    /// Role of a compute pool; `None` for other kinds.
    pub fn role(&self) -> Option<PoolRole> {
        if self.kind != ResourceKind::ComputePool {
            return None;
        }
        match self.attr("role").and_then(AttrValue::as_str) {
            Some(raw) => PoolRole::parse(raw),
            None => Some(PoolRole::Node),
        }
    }

    /// Every attribute reference in declaration order of attribute names.
    pub fn references(&self) -> Vec<&AttrRef> {
        self.attributes
            .values()
            .flat_map(|v| v.references())
            .collect()
    }
}

// =============================================================================
// CLUSTER
// =============================================================================

/// The full declared topology of one logical cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    /// May be left out of a declaration file and supplied by configuration
    #[serde(default)]
    pub cloud_id: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub provider_config: Attributes,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, cloud_id: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloud_id: cloud_id.into(),
            profile: profile.into(),
            provider_config: Attributes::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_resource(mut self, decl: ResourceDecl) -> Self {
        self.resources.push(decl);
        self
    }

    /// Check identity fields and key uniqueness.
    ///
    /// Cluster names become path components and provider name prefixes, so
    /// they are limited to lowercase alphanumerics and dashes.
    pub fn validate_identity(&self) -> Result<(), ClusterError> {
        if self.name.is_empty() {
            return Err(ClusterError::MissingIdentity { field: "name" });
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ClusterError::InvalidName {
                name: self.name.clone(),
            });
        }
        if self.cloud_id.is_empty() {
            return Err(ClusterError::MissingIdentity { field: "cloud_id" });
        }
        if self.profile.is_empty() {
            return Err(ClusterError::MissingIdentity { field: "profile" });
        }

        let mut seen = HashSet::new();
        let mut names: HashMap<(ResourceKind, &str), &ResourceKey> = HashMap::new();
        for decl in &self.resources {
            if decl.key.as_str().is_empty() {
                return Err(ClusterError::MissingIdentity { field: "resource key" });
            }
            if !seen.insert(&decl.key) {
                return Err(ClusterError::DuplicateKey {
                    key: decl.key.clone(),
                });
            }
            // Provider names are built from the last key segment
            if let Some(first) = names.insert((decl.kind, decl.key.name()), &decl.key) {
                return Err(ClusterError::NameClash {
                    first: first.clone(),
                    second: decl.key.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.resources.iter().map(|r| &r.key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| &r.key == key)
    }

    pub fn get_mut(&mut self, key: &ResourceKey) -> Option<&mut ResourceDecl> {
        self.resources.iter_mut().find(|r| &r.key == key)
    }

    /// Declaration index of `key`.
    pub fn position(&self, key: &ResourceKey) -> Option<usize> {
        self.resources.iter().position(|r| &r.key == key)
    }

    /// Rendered output a reference points at, if rendered yet.
    pub fn output(&self, reference: &AttrRef) -> Option<&AttrValue> {
        self.get(&reference.key)
            .and_then(|decl| decl.outputs.get(&reference.field))
    }

    /// Replace the rendered outputs of one resource.
    pub fn render(&mut self, key: &ResourceKey, outputs: Attributes) -> Result<(), ClusterError> {
        let decl = self
            .get_mut(key)
            .ok_or_else(|| ClusterError::UnknownResource { key: key.clone() })?;
        decl.outputs = outputs;
        Ok(())
    }

    /// Forget the rendered outputs of one resource (after deletion).
    pub fn clear_outputs(&mut self, key: &ResourceKey) -> Result<(), ClusterError> {
        self.render(key, Attributes::new())
    }

    /// Substitute every reference in `value`; fails on the first reference
    /// whose target has not been rendered.
    pub fn resolve(&self, value: &AttrValue) -> Result<AttrValue, ClusterError> {
        match value {
            AttrValue::Ref(reference) => {
                if self.get(&reference.key).is_none() {
                    return Err(ClusterError::UnknownResource {
                        key: reference.key.clone(),
                    });
                }
                self.output(reference)
                    .cloned()
                    .ok_or_else(|| ClusterError::UnresolvedReference {
                        key: reference.key.clone(),
                        field: reference.field.clone(),
                    })
            }
            AttrValue::List(items) => items
                .iter()
                .map(|v| self.resolve(v))
                .collect::<Result<Vec<_>, _>>()
                .map(AttrValue::List),
            AttrValue::Map(map) => map
                .iter()
                .map(|(k, v)| self.resolve(v).map(|v| (k.clone(), v)))
                .collect::<Result<Attributes, _>>()
                .map(AttrValue::Map),
            scalar => Ok(scalar.clone()),
        }
    }

    /// Substitute the references that can be resolved, leaving the rest.
    pub fn resolve_partial(&self, value: &AttrValue) -> AttrValue {
        match value {
            AttrValue::Ref(reference) => self
                .output(reference)
                .cloned()
                .unwrap_or_else(|| value.clone()),
            AttrValue::List(items) => {
                AttrValue::List(items.iter().map(|v| self.resolve_partial(v)).collect())
            }
            AttrValue::Map(map) => AttrValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_partial(v)))
                    .collect(),
            ),
            scalar => scalar.clone(),
        }
    }
}
