//! Network providers.
//!
//! Each provider realizes networks on exactly one substrate technology:
//! - **Linux bridge**: kernel bridge devices managed with `ip link`
//! - **OVS**: Open vSwitch bridges (kernel or userspace datapath) via `ovs-vsctl`
//! - **Fake**: in-memory bookkeeping only, for tests and hosts without a substrate
//!
//! ## Contract
//!
//! ```text
//! create_network   exists + same config  -> Ok(AlreadyExisted)
//!                  exists + other config -> Conflict
//!                  absent                -> provision, Ok(Created)
//! delete_network   absent                -> Ok
//!                  present               -> deprovision
//! ```
//!
//! Both operations are safe to replay. Only a `Created` outcome may be undone
//! by the caller: a reused bridge can belong to another network.

mod bridge;
mod command;
mod fake;
mod ovs;

pub use bridge::LinuxBridgeProvider;
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use fake::FakeProvider;
pub use ovs::OvsProvider;

#[cfg(test)]
pub(crate) use command::testing;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::{NetworkError, Result};
use crate::types::Network;

/// What a successful create did on the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The resource was made by this call
    Created,
    /// A resource with a compatible configuration was already there
    AlreadyExisted,
}

/// Network provider trait - implemented by each substrate backend.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Short name of the backend (e.g., "linux-bridge", "ovs").
    fn kind(&self) -> &'static str;

    /// Provision the external resource for a network.
    ///
    /// Succeeds without changes, reporting `AlreadyExisted`, when the
    /// resource already exists with a compatible configuration.
    async fn create_network(&self, network: &Network) -> Result<Provisioned>;

    /// Remove the external resource for a network.
    ///
    /// Succeeds when the resource is already absent.
    async fn delete_network(&self, network: &Network) -> Result<()>;

    /// Check whether the external resource currently exists.
    async fn network_exists(&self, network: &Network) -> Result<bool>;
}

/// Check that every requested port is attached to an existing bridge.
///
/// Extra ports are expected: workload interfaces get attached to the bridge
/// after it is provisioned.
pub(crate) fn ensure_ports_present(bridge: &str, requested: &[String], actual: &[String]) -> Result<()> {
    let actual: BTreeSet<&str> = actual.iter().map(String::as_str).collect();
    let missing: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|p| !actual.contains(p))
        .collect();

    if !missing.is_empty() {
        return Err(NetworkError::Conflict(format!(
            "bridge {} already exists without requested ports {:?}",
            bridge, missing
        )));
    }
    Ok(())
}
