//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::NodeRuntime;
use crate::txn::context::ConflictGranularity;
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

/// Start a Tessera node.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Override the node endpoint.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Override the persisted layout file.
    #[arg(long)]
    pub layout_file: Option<PathBuf>,

    /// Override conflict granularity (stream, key).
    #[arg(long)]
    pub conflict_granularity: Option<ConflictGranularity>,
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
#[cfg(feature = "telemetry")]
fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(_level: &str) {}

/// Run the start command with the given config path.
pub async fn run_start_with_config(
    config_path: &Path,
    log_level: Option<String>,
    args: StartArgs,
) -> Result<()> {
    let mut config = Config::from_file(config_path)
        .with_context(|| format!("failed to load config from {:?}", config_path))?;
    config.apply_overrides(&ConfigOverrides {
        log_level,
        layout_file: args.layout_file,
        endpoint: args.endpoint,
        conflict_granularity: args.conflict_granularity,
    });

    init_tracing(&config.telemetry.log_level);

    let mut runtime = NodeRuntime::new(config)?;
    runtime.run().await
}
