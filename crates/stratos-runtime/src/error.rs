//! Runtime errors

use crate::config::ConfigError;
use st_02_convergence::ReconcileError;
use st_03_state_store::StateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("lock acquisition task failed: {0}")]
    LockTask(#[source] tokio::task::JoinError),

    #[error("interrupted while waiting for the lock of cluster '{0}'")]
    InterruptedWaitingForLock(String),

    #[error("reading cluster file {}: {source}", .path.display())]
    ClusterFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing cluster file {}: {source}", .path.display())]
    ClusterFileFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no stored document for cluster '{0}' and no cluster file given")]
    NoDocument(String),

    #[error("document describes cluster '{found}', configured for '{expected}'")]
    NameMismatch { expected: String, found: String },

    #[error("unsupported profile '{0}' (expected 'local' or 'memory')")]
    UnsupportedProfile(String),

    #[error("opening local cloud inventory {}: {source}", .path.display())]
    LocalCloud {
        path: PathBuf,
        source: std::io::Error,
    },
}
