//! Configuration management for the network service.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use vortex_common::LogFormat;
use vortex_network::NetworkType;

use crate::cli::Args;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vortex/server.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST server configuration
    pub server: ServerConfig,
    /// Record store configuration
    pub store: StoreConfig,
    /// Workload collaborator configuration
    pub workloads: WorkloadsConfig,
    /// Network provider configuration
    pub providers: ProvidersConfig,
    /// Background reconciliation
    pub reconcile: ReconcileConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse config file")
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref listen) = args.listen {
            self.server.listen_address = listen.clone();
        }

        if let Some(ref path) = args.store_path {
            self.store.path = Some(path.clone());
        }

        if let Some(ref endpoint) = args.workloads_endpoint {
            self.workloads.endpoint = Some(endpoint.clone());
        }

        if args.dev {
            self.providers.dev = true;
        }

        self
    }

    /// Defaults plus CLI overrides, used when no config file exists.
    pub fn default_with_cli(args: &Args) -> Self {
        Self::default().with_cli_overrides(args)
    }
}

/// REST server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:7890".to_string(),
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file the records are persisted to. In-memory only when unset.
    pub path: Option<String>,
}

/// Workload collaborator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkloadsConfig {
    /// Scheduler API base URL. An in-memory source is used when unset.
    pub endpoint: Option<String>,
    /// Timeout for each usage query
    pub timeout_secs: u64,
}

impl Default for WorkloadsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 5,
        }
    }
}

impl WorkloadsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Network provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Network types accepted by this service
    pub enabled: Vec<NetworkType>,
    /// Use the fake provider for every type
    pub dev: bool,
    /// Timeout for each substrate command
    pub command_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: NetworkType::ALL.to_vec(),
            dev: false,
            command_timeout_secs: 30,
        }
    }
}

impl ProvidersConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Background reconciliation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Seconds between passes, 0 disables
    pub interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Option<Duration> {
        match self.interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Logging output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `pretty` or `json`
    pub format: LogFormatSetting,
}

/// Log format as written in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    #[default]
    Pretty,
    Json,
}

impl From<LogFormatSetting> for LogFormat {
    fn from(setting: LogFormatSetting) -> Self {
        match setting {
            LogFormatSetting::Pretty => LogFormat::Pretty,
            LogFormatSetting::Json => LogFormat::Json,
        }
    }
}
