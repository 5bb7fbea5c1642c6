//! Configuration for the state coordinator

use crate::domain::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where cluster documents live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// JSON files under the state root
    #[default]
    Fs,
    /// Process memory; gone when the process exits
    Memory,
}

impl FromStr for StateKind {
    type Err = StateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fs" | "file" | "filesystem" => Ok(StateKind::Fs),
            "memory" | "mem" => Ok(StateKind::Memory),
            _ => Err(StateError::UnknownKind(raw.to_string())),
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateKind::Fs => "fs",
            StateKind::Memory => "memory",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    pub kind: StateKind,
    /// Root directory for documents and lock files
    pub path: PathBuf,
    /// How long to wait for another run to release the cluster
    pub lock_timeout: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            kind: StateKind::Fs,
            path: PathBuf::from("./_state"),
            lock_timeout: crate::adapters::lock::security::DEFAULT_LOCK_TIMEOUT,
        }
    }
}
