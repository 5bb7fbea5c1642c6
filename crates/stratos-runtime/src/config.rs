//! # Runtime Configuration
//!
//! Everything a run needs, read once from `STRATOS_*` environment variables
//! and passed down by reference.

use st_02_convergence::algorithms::Assignment;
use st_02_convergence::{DiffMode, EngineConfig, Overrides, RetryPolicy};
use st_03_state_store::{StateConfig, StateKind};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_STATE_STORE: &str = "STRATOS_STATE_STORE";
pub const ENV_STATE_STORE_PATH: &str = "STRATOS_STATE_STORE_PATH";
pub const ENV_PROFILE: &str = "STRATOS_PROFILE";
pub const ENV_CLOUD_ID: &str = "STRATOS_CLOUDID";
pub const ENV_NAME: &str = "STRATOS_NAME";
pub const ENV_CLUSTER_FILE: &str = "STRATOS_CLUSTER_FILE";
pub const ENV_SET: &str = "STRATOS_SET";
pub const ENV_MASTER_SET: &str = "STRATOS_MASTER_SET";
pub const ENV_NODE_SET: &str = "STRATOS_NODE_SET";
pub const ENV_TEARDOWN: &str = "STRATOS_TEARDOWN";
pub const ENV_PURGE: &str = "STRATOS_PURGE";
pub const ENV_MAX_WORKERS: &str = "STRATOS_MAX_WORKERS";
pub const ENV_RETRY_ATTEMPTS: &str = "STRATOS_RETRY_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "STRATOS_RETRY_BASE_MS";
pub const ENV_DIFF_MODE: &str = "STRATOS_DIFF_MODE";
pub const ENV_LOCK_TIMEOUT_SECS: &str = "STRATOS_LOCK_TIMEOUT_SECS";

/// Profile served by the file-backed local simulator.
pub const DEFAULT_PROFILE: &str = "local";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}='{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for one run.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub name: String,
    /// Fills the document's cloud id when it has none
    pub cloud_id: String,
    pub profile: String,
    /// Declaration to converge toward; the stored document is used alone
    /// when unset
    pub cluster_file: Option<PathBuf>,
    pub state: StateConfig,
    pub engine: EngineConfig,
    /// Destroy instead of reconcile
    pub teardown: bool,
    /// Remove the stored document after a successful teardown
    pub purge: bool,
}

impl RuntimeConfig {
    /// Defaults for everything except the cluster name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloud_id: String::new(),
            profile: DEFAULT_PROFILE.to_string(),
            cluster_file: None,
            state: StateConfig::default(),
            engine: EngineConfig::default(),
            teardown: false,
            purge: false,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let name = get(ENV_NAME).ok_or(ConfigError::Missing(ENV_NAME))?;
        let mut config = Self::new(name);

        if let Some(raw) = get(ENV_STATE_STORE) {
            config.state.kind = raw
                .parse::<StateKind>()
                .map_err(|e| invalid(ENV_STATE_STORE, &raw, e))?;
        }
        if let Some(path) = get(ENV_STATE_STORE_PATH) {
            config.state.path = PathBuf::from(path);
        }
        if let Some(secs) = parse_number::<u64>(&get, ENV_LOCK_TIMEOUT_SECS)? {
            config.state.lock_timeout = Duration::from_secs(secs);
        }

        if let Some(profile) = get(ENV_PROFILE) {
            config.profile = profile;
        }
        if let Some(cloud_id) = get(ENV_CLOUD_ID) {
            config.cloud_id = cloud_id;
        }
        config.cluster_file = get(ENV_CLUSTER_FILE).map(PathBuf::from);

        config.engine.overrides = Overrides {
            cluster: assignments(&get, ENV_SET)?,
            master: assignments(&get, ENV_MASTER_SET)?,
            node: assignments(&get, ENV_NODE_SET)?,
        };

        if let Some(workers) = parse_number::<usize>(&get, ENV_MAX_WORKERS)? {
            if workers == 0 {
                return Err(invalid(ENV_MAX_WORKERS, "0", "must be at least 1"));
            }
            config.engine.max_workers = workers;
        }
        config.engine.retry = retry_policy(&get)?;
        if let Some(raw) = get(ENV_DIFF_MODE) {
            config.engine.diff_mode = DiffMode::parse(&raw)
                .ok_or_else(|| invalid(ENV_DIFF_MODE, &raw, "expected 'semantic' or 'structural'"))?;
        }

        config.teardown = parse_flag(&get, ENV_TEARDOWN)?;
        config.purge = parse_flag(&get, ENV_PURGE)?;
        Ok(config)
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(var)
        .map(|raw| raw.parse::<T>().map_err(|e| invalid(var, &raw, e)))
        .transpose()
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match get(var).map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if v == "1" || v == "true" || v == "yes" => Ok(true),
        Some(v) if v == "0" || v == "false" || v == "no" => Ok(false),
        Some(v) => Err(invalid(var, &v, "expected true or false")),
    }
}

fn assignments(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Vec<Assignment>, ConfigError> {
    match get(var) {
        Some(raw) => Assignment::parse_list(&raw).map_err(|e| invalid(var, &raw, e)),
        None => Ok(Vec::new()),
    }
}

fn retry_policy(get: &impl Fn(&str) -> Option<String>) -> Result<RetryPolicy, ConfigError> {
    let mut policy = RetryPolicy::default();
    if let Some(attempts) = parse_number::<u32>(get, ENV_RETRY_ATTEMPTS)? {
        if attempts == 0 {
            return Err(invalid(ENV_RETRY_ATTEMPTS, "0", "must be at least 1"));
        }
        policy.max_attempts = attempts;
    }
    if let Some(millis) = parse_number::<u64>(get, ENV_RETRY_BASE_MS)? {
        policy.base_delay = Duration::from_millis(millis);
    }
    Ok(policy)
}
