//! State store error types

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the per-cluster run lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to create lock file {}: {source}", .path.display())]
    CreateFailed { path: PathBuf, source: io::Error },

    #[error("{}", already_locked(.pid, .path))]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },

    #[error("failed to write PID to lock file: {0}")]
    WriteFailed(io::Error),

    #[error("lock path {} escapes the state root", .0.display())]
    OutsideRoot(PathBuf),

    /// In-process lease already taken.
    #[error("cluster '{0}' is already locked in this process")]
    Busy(String),
}

fn already_locked(pid: &Option<u32>, path: &Path) -> String {
    match pid {
        Some(p) => format!("cluster already in use by process {} ({})", p, path.display()),
        None => format!("cluster already in use ({})", path.display()),
    }
}

/// Errors from loading, committing or removing cluster state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no state stored for cluster '{0}'")]
    NotFound(String),

    #[error("invalid cluster name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("I/O error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("corrupt state at {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode cluster '{name}': {source}")]
    Encode {
        name: String,
        source: serde_json::Error,
    },

    #[error("unknown state store kind '{0}'")]
    UnknownKind(String),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}
