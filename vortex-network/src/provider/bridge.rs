//! Linux kernel bridge provider.
//!
//! Bridges are created with `ip link add ... type bridge`, uplinks are
//! enslaved with `ip link set ... master`, and an existing bridge is compared
//! by its set of enslaved ports.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::{NetworkError, Result};
use crate::types::{BackendConfig, Network};
use super::command::{CommandOutput, CommandRunner, SystemCommandRunner};
use super::{ensure_ports_present, NetworkProvider, Provisioned};

/// Linux bridge provider.
pub struct LinuxBridgeProvider {
    runner: Arc<dyn CommandRunner>,
    /// `ip` binary path
    ip_path: String,
}

impl LinuxBridgeProvider {
    /// Create a provider that runs `ip` on the local host.
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemCommandRunner::new()))
    }

    /// Create a provider with a custom command runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            ip_path: "ip".to_string(),
        }
    }

    /// Set the `ip` binary path.
    pub fn with_ip_path(mut self, path: impl Into<String>) -> Self {
        self.ip_path = path.into();
        self
    }

    fn uplinks(network: &Network) -> Result<&[String]> {
        match &network.backend {
            BackendConfig::Bridge(cfg) => Ok(&cfg.uplinks),
            other => Err(NetworkError::InvalidSpec(format!(
                "linux bridge provider cannot handle {} networks",
                other.network_type()
            ))),
        }
    }

    async fn ip(&self, args: &[&str]) -> std::io::Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(&self.ip_path, &args).await
    }

    async fn bridge_exists(&self, bridge: &str) -> std::result::Result<bool, String> {
        let output = self
            .ip(&["link", "show", "dev", bridge])
            .await
            .map_err(|e| format!("ip link show failed: {}", e))?;

        if output.success() {
            Ok(true)
        } else if is_missing_device(&output.stderr) {
            Ok(false)
        } else {
            Err(format!("ip link show {}: {}", bridge, output.stderr.trim()))
        }
    }

    async fn bridge_ports(&self, bridge: &str) -> Result<Vec<String>> {
        let output = self
            .ip(&["-o", "link", "show", "master", bridge])
            .await
            .map_err(|e| NetworkError::ProvisionFailure(format!("ip link show failed: {}", e)))?;

        if !output.success() {
            return Err(NetworkError::ProvisionFailure(format!(
                "failed to list ports of {}: {}",
                bridge,
                output.stderr.trim()
            )));
        }
        Ok(parse_link_names(&output.stdout))
    }

    async fn verify_existing(&self, bridge: &str, uplinks: &[String]) -> Result<Provisioned> {
        let ports = self.bridge_ports(bridge).await?;
        ensure_ports_present(bridge, uplinks, &ports)?;
        debug!(bridge = %bridge, "Bridge already exists with requested uplinks");
        Ok(Provisioned::AlreadyExisted)
    }

    /// Remove a bridge we created during a failed provisioning attempt.
    async fn rollback(&self, bridge: &str) {
        match self.ip(&["link", "del", "dev", bridge]).await {
            Ok(output) if output.success() || is_missing_device(&output.stderr) => {}
            Ok(output) => warn!(bridge = %bridge, error = %output.stderr.trim(), "Failed to roll back bridge"),
            Err(e) => warn!(bridge = %bridge, error = %e, "Failed to roll back bridge"),
        }
    }
}

impl Default for LinuxBridgeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkProvider for LinuxBridgeProvider {
    fn kind(&self) -> &'static str {
        "linux-bridge"
    }

    #[instrument(skip(self, network), fields(network = %network.name, bridge = %network.bridge_name))]
    async fn create_network(&self, network: &Network) -> Result<Provisioned> {
        let bridge = network.bridge_name.as_str();
        let uplinks = Self::uplinks(network)?;

        if self.bridge_exists(bridge).await.map_err(NetworkError::ProvisionFailure)? {
            return self.verify_existing(bridge, uplinks).await;
        }

        info!("Creating Linux bridge");

        let output = self
            .ip(&["link", "add", "name", bridge, "type", "bridge"])
            .await
            .map_err(|e| NetworkError::ProvisionFailure(format!("ip link add failed: {}", e)))?;

        if !output.success() {
            if is_already_exists(&output.stderr) {
                // Lost a race with another creator; accept it if it matches.
                return self.verify_existing(bridge, uplinks).await;
            }
            return Err(NetworkError::ProvisionFailure(format!(
                "ip link add {}: {}",
                bridge,
                output.stderr.trim()
            )));
        }

        for uplink in uplinks {
            let step = self.ip(&["link", "set", "dev", uplink, "master", bridge]).await;
            let failure = match step {
                Ok(output) if output.success() => None,
                Ok(output) => Some(output.stderr.trim().to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(error) = failure {
                self.rollback(bridge).await;
                return Err(NetworkError::ProvisionFailure(format!(
                    "failed to attach {} to {}: {}",
                    uplink, bridge, error
                )));
            }
        }

        let failure = match self.ip(&["link", "set", "dev", bridge, "up"]).await {
            Ok(output) if output.success() => None,
            Ok(output) => Some(output.stderr.trim().to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(error) = failure {
            self.rollback(bridge).await;
            return Err(NetworkError::ProvisionFailure(format!(
                "failed to bring up {}: {}",
                bridge, error
            )));
        }

        info!(uplinks = ?uplinks, "Linux bridge created");
        Ok(Provisioned::Created)
    }

    #[instrument(skip(self, network), fields(network = %network.name, bridge = %network.bridge_name))]
    async fn delete_network(&self, network: &Network) -> Result<()> {
        let bridge = network.bridge_name.as_str();

        if !self.bridge_exists(bridge).await.map_err(NetworkError::DeprovisionFailure)? {
            debug!("Bridge already absent");
            return Ok(());
        }

        let output = self
            .ip(&["link", "del", "dev", bridge])
            .await
            .map_err(|e| NetworkError::DeprovisionFailure(format!("ip link del failed: {}", e)))?;

        if !output.success() && !is_missing_device(&output.stderr) {
            return Err(NetworkError::DeprovisionFailure(format!(
                "ip link del {}: {}",
                bridge,
                output.stderr.trim()
            )));
        }

        info!("Linux bridge deleted");
        Ok(())
    }

    async fn network_exists(&self, network: &Network) -> Result<bool> {
        self.bridge_exists(&network.bridge_name)
            .await
            .map_err(NetworkError::DependencyUnavailable)
    }
}

fn is_missing_device(stderr: &str) -> bool {
    stderr.contains("does not exist") || stderr.contains("Cannot find device")
}

fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("File exists")
}

/// Extract interface names from `ip -o link show` output.
///
/// Lines look like `3: eth1@if2: <BROADCAST,MULTICAST,UP> mtu 1500 master br0 ...`.
fn parse_link_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split(": ").nth(1))
        .map(|name| name.split('@').next().unwrap_or(name).trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
