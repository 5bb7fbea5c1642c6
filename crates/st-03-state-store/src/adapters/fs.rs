//! Filesystem state store
//!
//! One directory per cluster under the root:
//!
//! ```text
//! <root>/<cluster>/cluster.json   pretty JSON document
//! <root>/<cluster>/LOCK           run lock, see `lock`
//! ```

use crate::domain::{validate_cluster_name, StateError};
use crate::ports::outbound::StateStore;
use shared_types::Cluster;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Document file name inside a cluster directory.
pub const STATE_FILE: &str = "cluster.json";

pub struct FsStateStore {
    root: PathBuf,
}

impl FsStateStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cluster_dir(&self, name: &str) -> Result<PathBuf, StateError> {
        validate_cluster_name(name)?;
        Ok(self.root.join(name))
    }

    fn state_path(&self, name: &str) -> Result<PathBuf, StateError> {
        Ok(self.cluster_dir(name)?.join(STATE_FILE))
    }
}

/// Write through a temp file, fsync, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}

impl StateStore for FsStateStore {
    fn exists(&self, name: &str) -> Result<bool, StateError> {
        Ok(self.state_path(name)?.is_file())
    }

    fn load(&self, name: &str) -> Result<Cluster, StateError> {
        let path = self.state_path(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(name.to_string()))
            }
            Err(e) => return Err(StateError::io(path, e)),
        };

        let cluster: Cluster =
            serde_json::from_slice(&bytes).map_err(|source| StateError::Corrupt {
                path: path.clone(),
                source,
            })?;
        debug!(cluster = %name, resources = cluster.resources.len(), "[st-03] Loaded state");
        Ok(cluster)
    }

    fn commit(&self, cluster: &Cluster) -> Result<(), StateError> {
        let dir = self.cluster_dir(&cluster.name)?;
        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;

        let bytes = serde_json::to_vec_pretty(cluster).map_err(|source| StateError::Encode {
            name: cluster.name.clone(),
            source,
        })?;
        let path = dir.join(STATE_FILE);
        write_atomic(&path, &bytes).map_err(|e| StateError::io(&path, e))?;

        info!(cluster = %cluster.name, path = %path.display(), "[st-03] State committed");
        Ok(())
    }

    fn destroy(&self, name: &str) -> Result<(), StateError> {
        let path = self.state_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StateError::io(path, e)),
        }
        // Fails while the lock file is present; the directory then stays
        let _ = fs::remove_dir(self.cluster_dir(name)?);

        info!(cluster = %name, "[st-03] State destroyed");
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StateError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StateError::io(&self.root, e))?;
            if !entry.path().join(STATE_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
