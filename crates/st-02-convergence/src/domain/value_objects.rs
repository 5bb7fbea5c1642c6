//! Value objects for convergence

use serde::{Deserialize, Serialize};
use shared_types::{AttrValue, Attributes, ResourceKey};
use std::fmt;

/// Adapter operation, used to attribute failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Actual,
    Expected,
    Apply,
    Delete,
    Render,
    Tag,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Actual => "actual",
            Operation::Expected => "expected",
            Operation::Apply => "apply",
            Operation::Delete => "delete",
            Operation::Render => "render",
            Operation::Tag => "tag",
        };
        f.write_str(name)
    }
}

/// How strictly actual and expected attributes are compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    /// Attributes only the provider reports (defaults) are ignored.
    #[default]
    Semantic,
    /// Every attribute on either side is compared.
    Structural,
}

impl DiffMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "semantic" => Some(DiffMode::Semantic),
            "structural" => Some(DiffMode::Structural),
            _ => None,
        }
    }
}

/// One attribute that differs between actual and expected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub actual: Option<AttrValue>,
    pub expected: Option<AttrValue>,
}

/// Per-resource verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    Unchanged,
    Create,
    Update { fields: Vec<FieldChange> },
    Delete,
}

impl Change {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Change::Unchanged)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Change::Unchanged => "unchanged",
            Change::Create => "create",
            Change::Update { .. } => "update",
            Change::Delete => "delete",
        }
    }
}

/// Verdict counts of a change set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
}

/// Verdicts for every resource of a run, in graph order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    entries: Vec<(ResourceKey, Change)>,
}

impl ChangeSet {
    pub(crate) fn new(entries: Vec<(ResourceKey, Change)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Change> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, change)| change)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &Change)> {
        self.entries.iter().map(|(k, c)| (k, c))
    }

    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for (_, change) in &self.entries {
            match change {
                Change::Unchanged => counts.unchanged += 1,
                Change::Create => counts.create += 1,
                Change::Update { .. } => counts.update += 1,
                Change::Delete => counts.delete += 1,
            }
        }
        counts
    }

    /// True when nothing needs to change.
    pub fn is_converged(&self) -> bool {
        self.entries.iter().all(|(_, c)| c.is_unchanged())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outputs one resource writes back into the cluster document.
///
/// Adapters never touch the document directly; the scheduler commits
/// patches one at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderPatch {
    pub key: ResourceKey,
    pub outputs: Attributes,
}
