//! # Stratos Runtime
//!
//! Wires the subsystems into one run:
//!
//! - `config` - `RuntimeConfig` from `STRATOS_*` environment variables
//! - `provider` - cloud provider chosen by profile
//! - `document` - declaration file merged over the stored document
//! - `runtime` - lock, load, converge or destroy, persist
//!
//! ## Exit Behaviour
//!
//! A run either converges, converges partially (the partial document is
//! persisted and the error names the failed resources), or fails before
//! any provider mutation.

pub mod config;
pub mod document;
pub mod error;
pub mod provider;
pub mod runtime;

pub use config::{ConfigError, RuntimeConfig};
pub use error::RuntimeError;
pub use provider::provider_for;
pub use runtime::{Action, RunSummary, Runtime};

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
