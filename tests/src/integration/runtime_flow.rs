//! # Runtime Flow
//!
//! The full run path: environment configuration, lock, stored document,
//! engine, persistence.

#[cfg(test)]
mod tests {
    use super::super::fixtures::web_cluster;
    use shared_types::{AttrValue, ResourceKind};
    use st_02_convergence::{FileBackedCloud, InMemoryCloud};
    use st_03_state_store::{LockError, StateCoordinator, StateError};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use stratos_runtime::config::{
        ENV_CLUSTER_FILE, ENV_MASTER_SET, ENV_NAME, ENV_NODE_SET, ENV_PURGE, ENV_SET, ENV_STATE_STORE,
        ENV_STATE_STORE_PATH, ENV_TEARDOWN,
    };
    use stratos_runtime::provider::LOCAL_CLOUD_FILE;
    use stratos_runtime::{provider_for, Action, RunSummary, Runtime, RuntimeConfig, RuntimeError};
    use tempfile::TempDir;
    use tokio::sync::watch;

    fn config(vars: &[(&str, &str)]) -> RuntimeConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    fn write_declaration(root: &Path) -> String {
        let path = root.join("alpha.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&web_cluster("alpha")).unwrap()).unwrap();
        path.to_string_lossy().into_owned()
    }

    async fn run_local(config: RuntimeConfig) -> RunSummary {
        let provider = provider_for(&config).unwrap();
        let (_tx, rx) = watch::channel(false);
        Runtime::new(config).execute(provider, rx).await.unwrap()
    }

    #[tokio::test]
    async fn test_local_profile_lifecycle() {
        let root = TempDir::new().unwrap();
        let state = root.path().to_string_lossy().into_owned();
        let file = write_declaration(root.path());
        let base = [
            (ENV_NAME, "alpha"),
            (ENV_STATE_STORE_PATH, state.as_str()),
            (ENV_CLUSTER_FILE, file.as_str()),
        ];

        let first = run_local(config(&base)).await;
        assert_eq!(first.action, Action::Reconcile);
        assert_eq!(first.created.len(), 8);

        // A fresh process reopens the simulated inventory and finds it converged
        let second = run_local(config(&base)).await;
        assert_eq!(second.created.len(), 0);
        assert_eq!(second.updated.len(), 0);
        assert_eq!(second.unchanged.len(), 8);
        assert_ne!(first.run_id, second.run_id);

        let runtime = Runtime::new(config(&base));
        let stored = runtime.coordinator().load("alpha").unwrap().unwrap();
        assert!(stored.resources.iter().all(|d| d.provider_id().is_some()));

        let mut teardown = base.to_vec();
        teardown.push((ENV_TEARDOWN, "true"));
        teardown.push((ENV_PURGE, "yes"));
        let third = run_local(config(&teardown)).await;
        assert_eq!(third.action, Action::Destroy);
        assert_eq!(third.deleted.len(), 8);
        assert!(third.purged);

        assert!(runtime.coordinator().load("alpha").unwrap().is_none());
        let cloud = FileBackedCloud::open(root.path().join(LOCAL_CLOUD_FILE)).unwrap();
        assert!(cloud.inner().objects().is_empty());
    }

    #[tokio::test]
    async fn test_held_lock_blocks_run_without_provider_calls() {
        let root = TempDir::new().unwrap();
        let state = root.path().to_string_lossy().into_owned();
        let file = write_declaration(root.path());
        let mut config = config(&[
            (ENV_NAME, "alpha"),
            (ENV_STATE_STORE_PATH, state.as_str()),
            (ENV_CLUSTER_FILE, file.as_str()),
        ]);
        config.state.lock_timeout = Duration::from_millis(50);

        let other = StateCoordinator::new(config.state.clone());
        let _held = other.lock("alpha").unwrap();

        let cloud = Arc::new(InMemoryCloud::new());
        let (_tx, rx) = watch::channel(false);
        let err = Runtime::new(config).execute(cloud.clone(), rx).await.unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::State(StateError::Lock(LockError::AlreadyLocked { .. }))
        ));
        assert!(cloud.journal().is_empty());
    }

    #[tokio::test]
    async fn test_overrides_reach_the_provider() {
        let root = TempDir::new().unwrap();
        let file = write_declaration(root.path());
        let config = config(&[
            (ENV_NAME, "alpha"),
            (ENV_STATE_STORE, "memory"),
            (ENV_CLUSTER_FILE, file.as_str()),
            (ENV_SET, "region=us-east1"),
            (ENV_MASTER_SET, "size=3"),
            (ENV_NODE_SET, "machine_type=n1-standard-8, size.max=9"),
        ]);

        let cloud = Arc::new(InMemoryCloud::new());
        let (_tx, rx) = watch::channel(false);
        let runtime = Runtime::new(config);
        let summary = runtime.execute(cloud.clone(), rx).await.unwrap();
        assert_eq!(summary.created.len(), 8);

        let masters = cloud.object(ResourceKind::ComputePool, "alpha-masters").unwrap();
        assert_eq!(masters.attributes.get("size"), Some(&AttrValue::Int(3)));
        assert_eq!(masters.attributes.get("machine_type"), Some(&AttrValue::Str("n1-standard-2".into())));

        let workers = cloud.object(ResourceKind::ComputePool, "alpha-workers").unwrap();
        assert_eq!(workers.attributes.get("machine_type"), Some(&AttrValue::Str("n1-standard-8".into())));
        let size = workers.attributes.get("size").and_then(AttrValue::as_map).unwrap();
        assert_eq!(size.get("min"), Some(&AttrValue::Int(2)));
        assert_eq!(size.get("max"), Some(&AttrValue::Int(9)));

        let stored = runtime.coordinator().load("alpha").unwrap().unwrap();
        assert_eq!(
            stored.provider_config.get("region"),
            Some(&AttrValue::Str("us-east1".into()))
        );
    }
}
