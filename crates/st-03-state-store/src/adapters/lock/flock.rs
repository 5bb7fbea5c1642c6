//! Per-cluster file lock using `fs2` (flock on Unix, LockFile on Windows).
//!
//! The lock file is never unlinked. Every contender must lock the same
//! inode; the OS drops the lock when its holder exits, so a crashed run
//! needs no cleanup.

use super::security::{validate_lock_path, MAX_RETRY_DELAY};
use crate::domain::LockError;
use fs2::FileExt;
use st_02_convergence::RunLease;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Exclusive right to run against one cluster.
///
/// Held until dropped. The lock file carries the holder's PID, reported to
/// runs that find the cluster busy.
pub struct ClusterLock {
    /// Kept open to maintain the lock
    file: File,
    path: PathBuf,
    cluster: String,
    pid: u32,
}

impl ClusterLock {
    pub const LOCK_FILE: &'static str = "LOCK";

    /// Acquire `<root>/<cluster>/LOCK`, retrying with exponential backoff
    /// until `timeout` expires.
    pub fn acquire(root: &Path, cluster: &str, timeout: Duration) -> Result<Self, LockError> {
        let dir = root.join(cluster);
        let lock_path = dir.join(Self::LOCK_FILE);
        std::fs::create_dir_all(&dir).map_err(|source| LockError::CreateFailed {
            path: lock_path.clone(),
            source,
        })?;

        let deadline = Instant::now() + timeout;
        let mut retry_delay = Duration::from_millis(50);

        loop {
            if lock_path.exists() && !validate_lock_path(root, &lock_path) {
                return Err(LockError::OutsideRoot(lock_path));
            }

            // No truncation here: the holder's PID must survive a failed attempt
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .map_err(|source| LockError::CreateFailed {
                    path: lock_path.clone(),
                    source,
                })?;

            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    let pid = std::process::id();
                    let mut locked_file = file;
                    locked_file.set_len(0).map_err(LockError::WriteFailed)?;
                    writeln!(locked_file, "{}", pid).map_err(LockError::WriteFailed)?;
                    locked_file.sync_all().map_err(LockError::WriteFailed)?;

                    info!(cluster = %cluster, pid, "[st-03] Lock acquired");
                    return Ok(Self {
                        file: locked_file,
                        path: lock_path,
                        cluster: cluster.to_string(),
                        pid,
                    });
                }
                Err(_) => {
                    let holder = Self::read_existing_pid(&lock_path);

                    if Instant::now() >= deadline {
                        warn!(cluster = %cluster, holder = ?holder, "[st-03] Lock still busy at deadline");
                        return Err(LockError::AlreadyLocked {
                            pid: holder,
                            path: lock_path,
                        });
                    }

                    debug!(cluster = %cluster, holder = ?holder, delay_ms = retry_delay.as_millis() as u64, "[st-03] Lock busy, waiting");
                    drop(file);
                    std::thread::sleep(retry_delay.min(deadline.saturating_duration_since(Instant::now())));
                    retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl RunLease for ClusterLock {
    fn cluster_name(&self) -> &str {
        &self.cluster
    }

    /// Still ours only while the file on disk names this process.
    fn is_held(&self) -> bool {
        Self::read_existing_pid(&self.path) == Some(self.pid)
    }
}

impl Drop for ClusterLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(cluster = %self.cluster, "[st-03] Lock released");
    }
}
