//! Key-path overrides
//!
//! `key.path=value` assignments layered onto the document during Init, at
//! three scopes: cluster-wide (`provider_config`), master pools and node
//! pools. Values parse as bool, then integer, then string.

use crate::domain::errors::StructuralError;
use serde::{Deserialize, Serialize};
use shared_types::{AttrValue, Attributes, Cluster, PoolRole};
use tracing::debug;

/// One `key.path=value` assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub path: Vec<String>,
    pub value: AttrValue,
}

impl Assignment {
    pub fn parse(raw: &str) -> Result<Self, StructuralError> {
        let invalid = |reason: &str| StructuralError::InvalidOverride {
            assignment: raw.to_string(),
            reason: reason.to_string(),
        };

        let (path, value) = raw.split_once('=').ok_or_else(|| invalid("expected key=value"))?;
        let path: Vec<String> = path.trim().split('.').map(|s| s.trim().to_string()).collect();
        if path.iter().any(String::is_empty) {
            return Err(invalid("empty path segment"));
        }

        Ok(Self {
            path,
            value: AttrValue::parse_scalar(value.trim()),
        })
    }

    /// Parse a comma-separated list; blank entries are ignored.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, StructuralError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Set the value at this path, creating intermediate maps.
    pub fn apply_to(&self, target: &mut Attributes) -> Result<(), StructuralError> {
        let Some((last, parents)) = self.path.split_last() else {
            return Ok(());
        };

        let mut current = target;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| AttrValue::Map(Attributes::new()));
            current = match entry {
                AttrValue::Map(map) => map,
                _ => {
                    return Err(StructuralError::InvalidOverride {
                        assignment: self.to_string(),
                        reason: format!("'{}' is not a map", segment),
                    })
                }
            };
        }
        current.insert(last.clone(), self.value.clone());
        Ok(())
    }
}

impl std::fmt::Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.path.join("."), self.value)
    }
}

/// Overrides at every scope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    /// Applied to `Cluster::provider_config`
    pub cluster: Vec<Assignment>,
    /// Applied to compute pools with role `master`
    pub master: Vec<Assignment>,
    /// Applied to compute pools with role `node`
    pub node: Vec<Assignment>,
}

impl Overrides {
    /// Parse the three comma-separated override lists.
    pub fn parse(cluster: &str, master: &str, node: &str) -> Result<Self, StructuralError> {
        Ok(Self {
            cluster: Assignment::parse_list(cluster)?,
            master: Assignment::parse_list(master)?,
            node: Assignment::parse_list(node)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.cluster.is_empty() && self.master.is_empty() && self.node.is_empty()
    }

    pub fn apply(&self, cluster: &mut Cluster) -> Result<(), StructuralError> {
        for assignment in &self.cluster {
            assignment.apply_to(&mut cluster.provider_config)?;
        }

        for decl in &mut cluster.resources {
            let scoped = match decl.role() {
                Some(PoolRole::Master) => &self.master,
                Some(PoolRole::Node) => &self.node,
                None => continue,
            };
            for assignment in scoped {
                debug!(resource = %decl.key, %assignment, "Applying override");
                assignment.apply_to(&mut decl.attributes)?;
            }
        }
        Ok(())
    }
}
