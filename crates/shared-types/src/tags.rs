//! # Tag Sets
//!
//! Ownership metadata attached to provider objects. Keys are unique; limits
//! follow the strictest common provider label rules.

use crate::errors::ClusterError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum tag key length.
pub const MAX_TAG_KEY_LEN: usize = 63;
/// Maximum tag value length.
pub const MAX_TAG_VALUE_LEN: usize = 255;

/// String-to-string tag mapping with unique keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag after validating key and value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ClusterError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() {
            return Err(ClusterError::InvalidTag {
                key,
                reason: "key is empty".into(),
            });
        }
        if key.len() > MAX_TAG_KEY_LEN {
            return Err(ClusterError::InvalidTag {
                reason: format!("key longer than {} characters", MAX_TAG_KEY_LEN),
                key,
            });
        }
        if value.len() > MAX_TAG_VALUE_LEN {
            return Err(ClusterError::InvalidTag {
                key,
                reason: format!("value longer than {} characters", MAX_TAG_VALUE_LEN),
            });
        }

        self.0.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Entries of `other` win on key collisions.
    pub fn merge(&mut self, other: &TagSet) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Whether every tag in `required` is present with the same value.
    pub fn contains_all(&self, required: &TagSet) -> bool {
        required
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).is_some_and(|have| have == v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
