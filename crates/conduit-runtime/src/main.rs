//! # Conduit
//!
//! Runs a [`ConduitRuntime`] until Ctrl+C.
//!
//! ```text
//! conduit [config.toml]
//! ```
//!
//! The configuration path may also come from `CONDUIT_CONFIG`. Without one,
//! defaults plus `CONDUIT_*` overrides apply.

use std::path::PathBuf;

use anyhow::{Context, Result};
use conduit_runtime::{ConduitRuntime, RuntimeConfig};
use conduit_telemetry::init_telemetry;
use tracing::{error, info};

/// First CLI argument, else `CONDUIT_CONFIG`.
fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("CONDUIT_CONFIG").map(PathBuf::from))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = RuntimeConfig::from_sources(config_path().as_deref())
        .context("failed to load configuration")?;

    // Initialize logging and metrics
    let _telemetry = init_telemetry(config.telemetry_config())?;

    // Create and start the runtime
    let runtime = ConduitRuntime::new(config);
    let report = runtime.start()?;
    info!(
        handlers = report.handlers.len(),
        subscriptions = report.subscription_count(),
        "Conduit is running. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;

    // Graceful shutdown
    if let Err(e) = runtime.shutdown().await {
        error!(error = %e, "Shutdown did not complete cleanly");
        return Err(e);
    }
    Ok(())
}
