//! # Vortex Network Service
//!
//! Provisions tenant networks on the host substrate (Linux bridge or Open
//! vSwitch) and tracks them in a record store, refusing to tear down a network
//! while workloads are still bound to it.
//!
//! ## Usage
//! ```bash
//! vortex-server --config /etc/vortex/server.yaml
//! vortex-server --dev --listen 127.0.0.1:7890
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use vortex_server::cli::Args;
use vortex_server::config::{Config, DEFAULT_CONFIG_PATH};
use vortex_server::server;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration before logging so the file can pick the format
    let (config, source) = match &args.config {
        Some(config_path) => (Config::load(config_path)?.with_cli_overrides(&args), config_path.as_str()),
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg.with_cli_overrides(&args), DEFAULT_CONFIG_PATH),
            Err(_) => (Config::default_with_cli(&args), "defaults"),
        },
    };

    vortex_common::init_logging_with_format(&args.log_level, config.logging.format.into())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %source,
        "Starting Vortex network service"
    );

    info!(
        listen = %config.server.listen_address,
        dev = config.providers.dev,
        enabled = ?config.providers.enabled,
        store = ?config.store.path,
        workloads = ?config.workloads.endpoint,
        "Network service configured"
    );

    if let Err(e) = server::run(config).await {
        error!(error = %e, "Server failed");
        return Err(e);
    }

    Ok(())
}
