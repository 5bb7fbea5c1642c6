//! Cloud provider selection by profile.

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use st_02_convergence::{CloudProvider, FileBackedCloud, InMemoryCloud};
use st_03_state_store::StateKind;
use std::sync::Arc;

/// Inventory of the `local` simulator, kept next to the cluster documents.
pub const LOCAL_CLOUD_FILE: &str = "local-cloud.json";

/// `local` persists a simulated inventory under the state root (in memory
/// when the state store is); `memory` never persists.
pub fn provider_for(config: &RuntimeConfig) -> Result<Arc<dyn CloudProvider>, RuntimeError> {
    match config.profile.as_str() {
        "local" if config.state.kind == StateKind::Fs => {
            let path = config.state.path.join(LOCAL_CLOUD_FILE);
            let cloud = FileBackedCloud::open(&path)
                .map_err(|source| RuntimeError::LocalCloud { path, source })?;
            Ok(Arc::new(cloud))
        }
        "local" | "memory" => Ok(Arc::new(InMemoryCloud::new())),
        other => Err(RuntimeError::UnsupportedProfile(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_profiles() {
        let root = TempDir::new().unwrap();
        let mut config = RuntimeConfig::new("alpha");
        config.state.path = root.path().to_path_buf();

        assert!(provider_for(&config).is_ok());
        config.profile = "memory".into();
        assert!(provider_for(&config).is_ok());
        config.profile = "aws".into();
        assert!(matches!(provider_for(&config), Err(RuntimeError::UnsupportedProfile(p)) if p == "aws"));
    }
}
