//! # Stratos
//!
//! Converges (or tears down) the cluster named by `STRATOS_NAME`.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging
//! 2. Load configuration from the environment
//! 3. Select the cloud provider for the profile
//! 4. Install the Ctrl+C handler
//! 5. Run, then print the summary as JSON

use anyhow::{Context, Result};
use stratos_runtime::{init_tracing, provider_for, Runtime, RuntimeConfig};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("installing tracing subscriber")?;

    let config = RuntimeConfig::from_env().context("loading configuration from environment")?;
    info!(
        cluster = %config.name,
        profile = %config.profile,
        state_store = %config.state.kind,
        state_path = %config.state.path.display(),
        teardown = config.teardown,
        "Starting Stratos"
    );

    let provider = provider_for(&config).context("selecting cloud provider")?;

    // In-flight provider calls finish; nothing new is started
    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight operations");
            let _ = interrupt_tx.send(true);
        }
    });

    let runtime = Runtime::new(config);
    let summary = runtime
        .execute(provider, interrupt_rx)
        .await
        .with_context(|| format!("run for cluster '{}' did not complete", runtime.config().name))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("encoding run summary")?
    );
    Ok(())
}
