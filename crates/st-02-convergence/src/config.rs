//! Configuration for the convergence engine

use crate::algorithms::overrides::Overrides;
use crate::algorithms::retry::RetryPolicy;
use crate::domain::value_objects::DiffMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra tags applied to every managed resource, next to the ownership tags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TagConfig {
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Engine configuration, built once per run and passed by reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum provider operations in flight
    pub max_workers: usize,
    pub retry: RetryPolicy,
    pub diff_mode: DiffMode,
    pub tags: TagConfig,
    pub overrides: Overrides,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            retry: RetryPolicy::default(),
            diff_mode: DiffMode::Semantic,
            tags: TagConfig::default(),
            overrides: Overrides::default(),
        }
    }
}

impl EngineConfig {
    /// Worker count, never zero.
    pub fn workers(&self) -> usize {
        self.max_workers.max(1)
    }
}
