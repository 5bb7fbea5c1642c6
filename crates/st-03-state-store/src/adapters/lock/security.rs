//! Lock path checks and wait limits.

use std::path::Path;
use std::time::Duration;

/// How long `StateCoordinator::lock` waits by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound of the retry delay while waiting for a lock.
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Whether `lock_path` resolves to somewhere inside `root`.
pub fn validate_lock_path(root: &Path, lock_path: &Path) -> bool {
    lock_path
        .canonicalize()
        .ok()
        .and_then(|canonical| {
            root.canonicalize()
                .ok()
                .map(|root_canonical| canonical.starts_with(&root_canonical))
        })
        .unwrap_or(false)
}
