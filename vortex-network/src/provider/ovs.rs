//! Open vSwitch bridge provider.
//!
//! Handles both datapaths:
//! - `system` networks get a bridge on the kernel datapath
//! - `netdev` networks get a bridge on the userspace (DPDK) datapath
//!
//! Physical interfaces become bridge ports; VLAN tags are trunked on them.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::{NetworkError, Result};
use crate::types::{BackendConfig, Network, OvsConfig};
use super::command::{CommandOutput, CommandRunner, SystemCommandRunner};
use super::{ensure_ports_present, NetworkProvider, Provisioned};

/// `ovs-vsctl br-exists` exit code for a missing bridge.
const BR_EXISTS_MISSING: i32 = 2;

/// OVS bridge provider.
pub struct OvsProvider {
    runner: Arc<dyn CommandRunner>,
    /// ovs-vsctl binary path
    vsctl_path: String,
}

impl OvsProvider {
    /// Create a provider that runs `ovs-vsctl` on the local host.
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemCommandRunner::new()))
    }

    /// Create a provider with a custom command runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            vsctl_path: "ovs-vsctl".to_string(),
        }
    }

    /// Set the ovs-vsctl binary path.
    pub fn with_vsctl_path(mut self, path: impl Into<String>) -> Self {
        self.vsctl_path = path.into();
        self
    }

    /// Datapath type and config for a network.
    fn datapath(network: &Network) -> Result<(&'static str, &OvsConfig)> {
        match &network.backend {
            BackendConfig::System(cfg) => Ok(("system", cfg)),
            BackendConfig::Netdev(cfg) => Ok(("netdev", cfg)),
            other => Err(NetworkError::InvalidSpec(format!(
                "ovs provider cannot handle {} networks",
                other.network_type()
            ))),
        }
    }

    async fn vsctl(&self, args: &[String]) -> std::io::Result<CommandOutput> {
        self.runner.run(&self.vsctl_path, args).await
    }

    async fn vsctl_str(&self, args: &[&str]) -> std::io::Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.vsctl(&args).await
    }

    async fn bridge_exists(&self, bridge: &str) -> std::result::Result<bool, String> {
        let output = self
            .vsctl_str(&["br-exists", bridge])
            .await
            .map_err(|e| format!("ovs-vsctl br-exists failed: {}", e))?;

        match output.status {
            Some(0) => Ok(true),
            Some(BR_EXISTS_MISSING) => Ok(false),
            _ => Err(format!("ovs-vsctl br-exists {}: {}", bridge, output.stderr.trim())),
        }
    }

    async fn verify_existing(&self, bridge: &str, datapath: &str, config: &OvsConfig) -> Result<Provisioned> {
        let output = self
            .vsctl_str(&["get", "bridge", bridge, "datapath_type"])
            .await
            .map_err(|e| NetworkError::ProvisionFailure(format!("ovs-vsctl get failed: {}", e)))?;
        if !output.success() {
            return Err(NetworkError::ProvisionFailure(format!(
                "failed to read datapath of {}: {}",
                bridge,
                output.stderr.trim()
            )));
        }

        let existing = parse_datapath_type(&output.stdout);
        if existing != datapath {
            return Err(NetworkError::Conflict(format!(
                "bridge {} already exists with datapath {}, requested {}",
                bridge, existing, datapath
            )));
        }

        let output = self
            .vsctl_str(&["list-ports", bridge])
            .await
            .map_err(|e| NetworkError::ProvisionFailure(format!("ovs-vsctl list-ports failed: {}", e)))?;
        if !output.success() {
            return Err(NetworkError::ProvisionFailure(format!(
                "failed to list ports of {}: {}",
                bridge,
                output.stderr.trim()
            )));
        }

        let ports: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        ensure_ports_present(bridge, &config.physical_interfaces, &ports)?;

        for iface in &config.physical_interfaces {
            self.verify_trunks(iface, &config.vlan_tags).await?;
        }

        debug!(bridge = %bridge, "OVS bridge already exists with matching config");
        Ok(Provisioned::AlreadyExisted)
    }

    async fn verify_trunks(&self, iface: &str, vlan_tags: &[u16]) -> Result<()> {
        let output = self
            .vsctl_str(&["get", "port", iface, "trunks"])
            .await
            .map_err(|e| NetworkError::ProvisionFailure(format!("ovs-vsctl get failed: {}", e)))?;
        if !output.success() {
            return Err(NetworkError::ProvisionFailure(format!(
                "failed to read trunks of {}: {}",
                iface,
                output.stderr.trim()
            )));
        }

        let existing = parse_trunks(&output.stdout);
        let requested: BTreeSet<u16> = vlan_tags.iter().copied().collect();
        if existing != requested {
            return Err(NetworkError::Conflict(format!(
                "port {} already trunks VLANs {:?}, requested {:?}",
                iface, existing, requested
            )));
        }
        Ok(())
    }

    async fn rollback(&self, bridge: &str) {
        match self.vsctl_str(&["--if-exists", "del-br", bridge]).await {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(bridge = %bridge, error = %output.stderr.trim(), "Failed to roll back OVS bridge"),
            Err(e) => warn!(bridge = %bridge, error = %e, "Failed to roll back OVS bridge"),
        }
    }
}

impl Default for OvsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkProvider for OvsProvider {
    fn kind(&self) -> &'static str {
        "ovs"
    }

    #[instrument(skip(self, network), fields(network = %network.name, bridge = %network.bridge_name))]
    async fn create_network(&self, network: &Network) -> Result<Provisioned> {
        let bridge = network.bridge_name.as_str();
        let (datapath, config) = Self::datapath(network)?;

        if self.bridge_exists(bridge).await.map_err(NetworkError::ProvisionFailure)? {
            return self.verify_existing(bridge, datapath, config).await;
        }

        info!(datapath = %datapath, "Creating OVS bridge");

        let output = self
            .vsctl(&add_bridge_args(bridge, datapath))
            .await
            .map_err(|e| NetworkError::ProvisionFailure(format!("ovs-vsctl add-br failed: {}", e)))?;
        if !output.success() {
            if is_already_exists(&output.stderr) {
                // Another creator got there between br-exists and add-br.
                return self.verify_existing(bridge, datapath, config).await;
            }
            return Err(NetworkError::ProvisionFailure(format!(
                "ovs-vsctl add-br {}: {}",
                bridge,
                output.stderr.trim()
            )));
        }

        for iface in &config.physical_interfaces {
            let step = self.vsctl(&add_port_args(bridge, iface, &config.vlan_tags)).await;
            let failure = match step {
                Ok(output) if output.success() => None,
                Ok(output) => Some(output.stderr.trim().to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(error) = failure {
                self.rollback(bridge).await;
                return Err(NetworkError::ProvisionFailure(format!(
                    "failed to add port {} to {}: {}",
                    iface, bridge, error
                )));
            }
        }

        info!(
            ports = ?config.physical_interfaces,
            vlan_tags = ?config.vlan_tags,
            "OVS bridge created"
        );
        Ok(Provisioned::Created)
    }

    #[instrument(skip(self, network), fields(network = %network.name, bridge = %network.bridge_name))]
    async fn delete_network(&self, network: &Network) -> Result<()> {
        let bridge = network.bridge_name.as_str();

        let output = self
            .vsctl_str(&["--if-exists", "del-br", bridge])
            .await
            .map_err(|e| NetworkError::DeprovisionFailure(format!("ovs-vsctl del-br failed: {}", e)))?;
        if !output.success() {
            return Err(NetworkError::DeprovisionFailure(format!(
                "ovs-vsctl del-br {}: {}",
                bridge,
                output.stderr.trim()
            )));
        }

        info!("OVS bridge deleted");
        Ok(())
    }

    async fn network_exists(&self, network: &Network) -> Result<bool> {
        self.bridge_exists(&network.bridge_name)
            .await
            .map_err(NetworkError::DependencyUnavailable)
    }
}

fn add_bridge_args(bridge: &str, datapath: &str) -> Vec<String> {
    vec![
        "add-br".into(),
        bridge.into(),
        "--".into(),
        "set".into(),
        "bridge".into(),
        bridge.into(),
        format!("datapath_type={}", datapath),
    ]
}

fn add_port_args(bridge: &str, iface: &str, vlan_tags: &[u16]) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--may-exist".into(),
        "add-port".into(),
        bridge.into(),
        iface.into(),
    ];
    if !vlan_tags.is_empty() {
        let trunks = vlan_tags
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",");
        args.push(format!("trunks={}", trunks));
    }
    args
}

fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("already exists")
}

/// Parse `ovs-vsctl get port <if> trunks` output, e.g. `[10, 20]`.
fn parse_trunks(stdout: &str) -> BTreeSet<u16> {
    stdout
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .filter_map(|t| t.trim().parse().ok())
        .collect()
}

/// Parse `ovs-vsctl get bridge <br> datapath_type` output.
///
/// An empty value means the default (kernel) datapath.
fn parse_datapath_type(stdout: &str) -> &str {
    match stdout.trim().trim_matches('"') {
        "" => "system",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedRunner;
    use crate::types::NetworkSpec;

    fn network(datapath: &str, ifaces: &[&str], vlans: &[u16]) -> Network {
        let cfg = OvsConfig {
            physical_interfaces: ifaces.iter().map(|s| s.to_string()).collect(),
            vlan_tags: vlans.to_vec(),
        };
        let backend = match datapath {
            "netdev" => BackendConfig::Netdev(cfg),
            _ => BackendConfig::System(cfg),
        };
        Network::from_spec(NetworkSpec::new("tenant-a-net", backend), "owner")
    }

    #[test]
    fn test_parse_datapath_type() {
        assert_eq!(parse_datapath_type("\"\"\n"), "system");
        assert_eq!(parse_datapath_type("netdev\n"), "netdev");
        assert_eq!(parse_datapath_type("system"), "system");
    }

    #[test]
    fn test_add_port_args_with_trunks() {
        assert_eq!(
            add_port_args("system-1", "eth1", &[10, 20]).join(" "),
            "--may-exist add-port system-1 eth1 trunks=10,20"
        );
        assert_eq!(
            add_port_args("system-1", "eth1", &[]).join(" "),
            "--may-exist add-port system-1 eth1"
        );
    }

    #[tokio::test]
    async fn test_create_netdev_bridge() {
        let net = network("netdev", &["dpdk0"], &[100]);
        let br = net.bridge_name.clone();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&format!("ovs-vsctl br-exists {}", br), CommandOutput::failed(2, ""))
                .on(
                    &format!("ovs-vsctl {}", add_bridge_args(&br, "netdev").join(" ")),
                    CommandOutput::ok(""),
                )
                .on(
                    &format!("ovs-vsctl --may-exist add-port {} dpdk0 trunks=100", br),
                    CommandOutput::ok(""),
                ),
        );
        let provider = OvsProvider::with_runner(runner.clone());

        assert_eq!(provider.create_network(&net).await.unwrap(), Provisioned::Created);
        assert!(runner.was_called(&format!(
            "ovs-vsctl add-br {br} -- set bridge {br} datapath_type=netdev"
        )));
    }

    #[tokio::test]
    async fn test_create_existing_with_other_datapath_conflicts() {
        let net = network("system", &[], &[]);
        let br = net.bridge_name.clone();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&format!("ovs-vsctl br-exists {}", br), CommandOutput::ok(""))
                .on(
                    &format!("ovs-vsctl get bridge {} datapath_type", br),
                    CommandOutput::ok("netdev\n"),
                ),
        );
        let provider = OvsProvider::with_runner(runner);

        let err = provider.create_network(&net).await.unwrap_err();
        assert!(matches!(err, NetworkError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_existing_matching_is_noop() {
        let net = network("system", &["eth1"], &[]);
        let br = net.bridge_name.clone();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&format!("ovs-vsctl br-exists {}", br), CommandOutput::ok(""))
                .on(
                    &format!("ovs-vsctl get bridge {} datapath_type", br),
                    CommandOutput::ok("\"\"\n"),
                )
                .on(&format!("ovs-vsctl list-ports {}", br), CommandOutput::ok("eth1\nvnet7\n"))
                .on("ovs-vsctl get port eth1 trunks", CommandOutput::ok("[]\n")),
        );
        let provider = OvsProvider::with_runner(runner.clone());

        assert_eq!(provider.create_network(&net).await.unwrap(), Provisioned::AlreadyExisted);
        assert!(!runner.calls().iter().any(|c| c.contains("add-br")));
    }

    #[tokio::test]
    async fn test_create_existing_with_other_vlans_conflicts() {
        let net = network("system", &["eth1"], &[10, 20]);
        let br = net.bridge_name.clone();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&format!("ovs-vsctl br-exists {}", br), CommandOutput::ok(""))
                .on(
                    &format!("ovs-vsctl get bridge {} datapath_type", br),
                    CommandOutput::ok("system\n"),
                )
                .on(&format!("ovs-vsctl list-ports {}", br), CommandOutput::ok("eth1\n"))
                .on("ovs-vsctl get port eth1 trunks", CommandOutput::ok("[10, 30]\n")),
        );
        let provider = OvsProvider::with_runner(runner);

        let err = provider.create_network(&net).await.unwrap_err();
        assert!(matches!(err, NetworkError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_race_on_add_br_reuses_bridge() {
        let net = network("system", &[], &[]);
        let br = net.bridge_name.clone();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&format!("ovs-vsctl br-exists {}", br), CommandOutput::failed(2, ""))
                .on(
                    &format!("ovs-vsctl {}", add_bridge_args(&br, "system").join(" ")),
                    CommandOutput::failed(
                        1,
                        format!("ovs-vsctl: cannot create a bridge named {br} because a bridge named {br} already exists"),
                    ),
                )
                .on(
                    &format!("ovs-vsctl get bridge {} datapath_type", br),
                    CommandOutput::ok("system\n"),
                )
                .on(&format!("ovs-vsctl list-ports {}", br), CommandOutput::ok("")),
        );
        let provider = OvsProvider::with_runner(runner.clone());

        assert_eq!(provider.create_network(&net).await.unwrap(), Provisioned::AlreadyExisted);
        assert!(!runner.calls().iter().any(|c| c.contains("del-br")));
    }

    #[test]
    fn test_parse_trunks() {
        assert_eq!(parse_trunks("[10, 20]\n"), BTreeSet::from([10, 20]));
        assert!(parse_trunks("[]\n").is_empty());
    }

    #[tokio::test]
    async fn test_create_rolls_back_failed_port() {
        let net = network("system", &["eth1"], &[]);
        let br = net.bridge_name.clone();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&format!("ovs-vsctl br-exists {}", br), CommandOutput::failed(2, ""))
                .on(
                    &format!("ovs-vsctl {}", add_bridge_args(&br, "system").join(" ")),
                    CommandOutput::ok(""),
                )
                .on(
                    &format!("ovs-vsctl --may-exist add-port {} eth1", br),
                    CommandOutput::failed(1, "could not open network device eth1"),
                )
                .on(&format!("ovs-vsctl --if-exists del-br {}", br), CommandOutput::ok("")),
        );
        let provider = OvsProvider::with_runner(runner.clone());

        let err = provider.create_network(&net).await.unwrap_err();
        assert!(matches!(err, NetworkError::ProvisionFailure(_)));
        assert!(runner.was_called(&format!("ovs-vsctl --if-exists del-br {}", br)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let net = network("system", &[], &[]);
        let br = net.bridge_name.clone();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&format!("ovs-vsctl --if-exists del-br {}", br), CommandOutput::ok("")),
        );
        let provider = OvsProvider::with_runner(runner);

        provider.delete_network(&net).await.unwrap();
        provider.delete_network(&net).await.unwrap();
    }

    #[tokio::test]
    async fn test_exists_error_is_reported() {
        let net = network("system", &[], &[]);
        let br = net.bridge_name.clone();
        let runner = Arc::new(ScriptedRunner::new().on(
            &format!("ovs-vsctl br-exists {}", br),
            CommandOutput::failed(1, "database connection failed"),
        ));
        let provider = OvsProvider::with_runner(runner);

        assert!(matches!(
            provider.network_exists(&net).await,
            Err(NetworkError::DependencyUnavailable(_))
        ));
    }
}
