//! Command-line argument parsing.

use clap::Parser;

/// Vortex network service - tenant network lifecycle API
#[derive(Parser, Debug, Default)]
#[command(name = "vortex-server")]
#[command(about = "Vortex network service - tenant network lifecycle API")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Listen address for the REST API
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable development mode (fake provider for every network type)
    #[arg(long)]
    pub dev: bool,

    /// Persist network records to this JSON file
    #[arg(long, env = "VORTEX_STORE_PATH")]
    pub store_path: Option<String>,

    /// Base URL of the workload scheduler API
    #[arg(long, env = "VORTEX_WORKLOADS_ENDPOINT")]
    pub workloads_endpoint: Option<String>,
}
