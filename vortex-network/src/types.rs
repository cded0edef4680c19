//! Network data model.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NetworkError, Result};
use crate::naming;

/// Maximum length of a network name (DNS-1123 label).
pub const MAX_NETWORK_NAME_LEN: usize = 63;

/// Maximum length of a Linux interface name (`IFNAMSIZ - 1`).
pub const MAX_IFACE_NAME_LEN: usize = 15;

/// Highest valid 802.1Q VLAN ID.
pub const MAX_VLAN_TAG: u16 = 4095;

/// Backend technology that realizes a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Linux kernel bridge
    Bridge,
    /// OVS bridge on the kernel datapath
    System,
    /// OVS bridge on the userspace (DPDK) datapath
    Netdev,
    /// No-op backend for testing and hosts without a substrate
    Fake,
}

impl NetworkType {
    /// All supported network types.
    pub const ALL: [NetworkType; 4] = [
        NetworkType::Bridge,
        NetworkType::System,
        NetworkType::Netdev,
        NetworkType::Fake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Bridge => "bridge",
            NetworkType::System => "system",
            NetworkType::Netdev => "netdev",
            NetworkType::Fake => "fake",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bridge" => Ok(NetworkType::Bridge),
            "system" => Ok(NetworkType::System),
            "netdev" => Ok(NetworkType::Netdev),
            "fake" => Ok(NetworkType::Fake),
            other => Err(NetworkError::InvalidSpec(
                format!("unsupported network type: {}", other)
            )),
        }
    }
}

/// Linux bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Host interfaces enslaved to the bridge
    #[serde(default)]
    pub uplinks: Vec<String>,
}

/// Open vSwitch bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OvsConfig {
    /// Physical interfaces added as bridge ports
    #[serde(default)]
    pub physical_interfaces: Vec<String>,
    /// VLAN IDs trunked on the physical ports
    #[serde(default, rename = "vlanTags")]
    pub vlan_tags: Vec<u16>,
}

/// Fake backend parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeConfig {
    /// Opaque value echoed back in the record
    #[serde(default)]
    pub parameter: String,
    /// Make the fake provider fail creation
    #[serde(default, rename = "iWantFail")]
    pub want_fail: bool,
}

/// Backend-specific configuration, tagged by network type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Bridge(BridgeConfig),
    System(OvsConfig),
    Netdev(OvsConfig),
    Fake(FakeConfig),
}

impl BackendConfig {
    /// The network type this configuration belongs to.
    pub fn network_type(&self) -> NetworkType {
        match self {
            BackendConfig::Bridge(_) => NetworkType::Bridge,
            BackendConfig::System(_) => NetworkType::System,
            BackendConfig::Netdev(_) => NetworkType::Netdev,
            BackendConfig::Fake(_) => NetworkType::Fake,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            BackendConfig::Bridge(cfg) => validate_interfaces("uplinks", &cfg.uplinks),
            BackendConfig::System(cfg) | BackendConfig::Netdev(cfg) => {
                validate_interfaces("physicalInterfaces", &cfg.physical_interfaces)?;
                validate_vlan_tags(&cfg.vlan_tags)
            }
            BackendConfig::Fake(_) => Ok(()),
        }
    }
}

/// A network as requested by a tenant.
///
/// Any `bridgeName` present in the request body is ignored: the bridge name
/// is always derived from the type and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    #[serde(flatten)]
    pub backend: BackendConfig,
}

impl NetworkSpec {
    pub fn new(name: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    /// Spec for a fake network.
    pub fn fake(name: impl Into<String>) -> Self {
        Self::new(name, BackendConfig::Fake(FakeConfig::default()))
    }

    /// Spec for a Linux bridge network.
    pub fn bridge(name: impl Into<String>, uplinks: Vec<String>) -> Self {
        Self::new(name, BackendConfig::Bridge(BridgeConfig { uplinks }))
    }

    pub fn network_type(&self) -> NetworkType {
        self.backend.network_type()
    }

    /// Derive the bridge name for this spec.
    pub fn bridge_name(&self) -> String {
        naming::generate_bridge_name(self.network_type(), &self.name)
    }

    /// Validate the name and the backend configuration.
    pub fn validate(&self) -> Result<()> {
        validate_network_name(&self.name)?;
        self.backend.validate()
    }
}

/// Lifecycle phase of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum NetworkPhase {
    #[default]
    Requested,
    Provisioning,
    Active,
    ProvisionFailed,
    PendingDeletion,
    DeleteBlocked,
    Deleted,
}

impl fmt::Display for NetworkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkPhase::Requested => "requested",
            NetworkPhase::Provisioning => "provisioning",
            NetworkPhase::Active => "active",
            NetworkPhase::ProvisionFailed => "provisionFailed",
            NetworkPhase::PendingDeletion => "pendingDeletion",
            NetworkPhase::DeleteBlocked => "deleteBlocked",
            NetworkPhase::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

impl FromStr for NetworkPhase {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "requested" => Ok(NetworkPhase::Requested),
            "provisioning" => Ok(NetworkPhase::Provisioning),
            "active" => Ok(NetworkPhase::Active),
            "provisionFailed" => Ok(NetworkPhase::ProvisionFailed),
            "pendingDeletion" => Ok(NetworkPhase::PendingDeletion),
            "deleteBlocked" => Ok(NetworkPhase::DeleteBlocked),
            "deleted" => Ok(NetworkPhase::Deleted),
            other => Err(NetworkError::InvalidSpec(format!("unknown phase: {}", other))),
        }
    }
}

/// A provisioned network record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub bridge_name: String,
    #[serde(flatten)]
    pub backend: BackendConfig,
    pub created_at: DateTime<Utc>,
    pub phase: NetworkPhase,
}

impl Network {
    /// Build a new record from a spec, assigning an ID and deriving the bridge name.
    pub fn from_spec(spec: NetworkSpec, owner_id: impl Into<String>) -> Self {
        let bridge_name = spec.bridge_name();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: spec.name,
            bridge_name,
            backend: spec.backend,
            created_at: Utc::now(),
            phase: NetworkPhase::Requested,
        }
    }

    pub fn network_type(&self) -> NetworkType {
        self.backend.network_type()
    }
}

/// Validate a network name (lowercase DNS-1123 label).
pub fn validate_network_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NetworkError::InvalidSpec("network name is required".into()));
    }
    if name.len() > MAX_NETWORK_NAME_LEN {
        return Err(NetworkError::InvalidSpec(format!(
            "network name must be at most {} characters",
            MAX_NETWORK_NAME_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(NetworkError::InvalidSpec(format!(
            "network name {:?} may only contain lowercase alphanumerics and '-'",
            name
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(NetworkError::InvalidSpec(format!(
            "network name {:?} must start and end with an alphanumeric character",
            name
        )));
    }
    Ok(())
}

fn validate_interfaces(field: &str, interfaces: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for iface in interfaces {
        if iface.is_empty()
            || iface.len() > MAX_IFACE_NAME_LEN
            || iface.contains('/')
            || iface.chars().any(char::is_whitespace)
        {
            return Err(NetworkError::InvalidSpec(format!(
                "{}: invalid interface name {:?}",
                field, iface
            )));
        }
        if !seen.insert(iface.as_str()) {
            return Err(NetworkError::InvalidSpec(format!(
                "{}: duplicate interface {}",
                field, iface
            )));
        }
    }
    Ok(())
}

fn validate_vlan_tags(tags: &[u16]) -> Result<()> {
    let mut seen = HashSet::new();
    for tag in tags {
        if *tag > MAX_VLAN_TAG {
            return Err(NetworkError::InvalidSpec(format!(
                "vlanTags: {} exceeds {}",
                tag, MAX_VLAN_TAG
            )));
        }
        if !seen.insert(*tag) {
            return Err(NetworkError::InvalidSpec(format!("vlanTags: duplicate tag {}", tag)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_json_shape() {
        let json = r#"{
            "name": "tenant-a-net",
            "type": "system",
            "bridgeName": "caller-supplied",
            "physicalInterfaces": ["eth1"],
            "vlanTags": [100, 200]
        }"#;

        let spec: NetworkSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.network_type(), NetworkType::System);
        assert_eq!(
            spec.backend,
            BackendConfig::System(OvsConfig {
                physical_interfaces: vec!["eth1".into()],
                vlan_tags: vec![100, 200],
            })
        );
        assert_ne!(spec.bridge_name(), "caller-supplied");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"name": "n1", "type": "vxlan"}"#;
        assert!(serde_json::from_str::<NetworkSpec>(json).is_err());
        assert!(matches!(
            "vxlan".parse::<NetworkType>(),
            Err(NetworkError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_fake_failure_flag() {
        let json = r#"{"name": "n1", "type": "fake", "parameter": "x", "iWantFail": true}"#;
        let spec: NetworkSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec.backend,
            BackendConfig::Fake(FakeConfig { parameter: "x".into(), want_fail: true })
        );
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_network_name("tenant-a-net").is_ok());
        assert!(validate_network_name("a").is_ok());
        assert!(validate_network_name("").is_err());
        assert!(validate_network_name("Tenant").is_err());
        assert!(validate_network_name("-lead").is_err());
        assert!(validate_network_name("trail-").is_err());
        assert!(validate_network_name("has space").is_err());
        assert!(validate_network_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_backend_validation() {
        let bad_vlan = NetworkSpec::new(
            "n1",
            BackendConfig::Netdev(OvsConfig {
                physical_interfaces: vec!["dpdk0".into()],
                vlan_tags: vec![4096],
            }),
        );
        assert!(bad_vlan.validate().is_err());

        let dup_vlan = NetworkSpec::new(
            "n1",
            BackendConfig::System(OvsConfig {
                physical_interfaces: vec![],
                vlan_tags: vec![10, 10],
            }),
        );
        assert!(dup_vlan.validate().is_err());

        let long_iface = NetworkSpec::bridge("n1", vec!["a-very-long-interface".into()]);
        assert!(long_iface.validate().is_err());

        let dup_iface = NetworkSpec::bridge("n1", vec!["eth0".into(), "eth0".into()]);
        assert!(dup_iface.validate().is_err());

        assert!(NetworkSpec::bridge("n1", vec!["eth0".into()]).validate().is_ok());
    }

    #[test]
    fn test_record_roundtrip_keeps_backend() {
        let network = Network::from_spec(NetworkSpec::bridge("n1", vec!["eth0".into()]), "owner-1");
        let json = serde_json::to_value(&network).unwrap();
        assert_eq!(json["type"], "bridge");
        assert_eq!(json["bridgeName"], network.bridge_name.as_str());
        assert_eq!(json["uplinks"][0], "eth0");

        let back: Network = serde_json::from_value(json).unwrap();
        assert_eq!(back, network);
    }
}
