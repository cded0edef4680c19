//! Fake network provider for testing and development.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::{NetworkError, Result};
use crate::types::{BackendConfig, Network};
use super::{NetworkProvider, Provisioned};

/// Fake provider.
///
/// Performs no substrate calls. It remembers which bridge names it has
/// "provisioned" so tests can check that compensation and deletion really
/// happened. Accepts networks of any type.
///
/// That bookkeeping does not survive a restart while network records do, so
/// existence is judged by removals instead: a bridge exists unless this
/// instance saw it deleted.
pub struct FakeProvider {
    bridges: RwLock<HashMap<String, BackendConfig>>,
    removed: RwLock<HashSet<String>>,
    fail_deletes: AtomicBool,
}

impl FakeProvider {
    /// Create a new fake provider.
    pub fn new() -> Self {
        info!("Creating fake network provider");
        Self {
            bridges: RwLock::new(HashMap::new()),
            removed: RwLock::new(HashSet::new()),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent delete fail (or succeed again).
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Check whether a bridge is currently provisioned.
    pub fn contains(&self, bridge_name: &str) -> bool {
        self.bridges
            .read()
            .map(|b| b.contains_key(bridge_name))
            .unwrap_or(false)
    }

    /// Number of provisioned bridges.
    pub fn len(&self) -> usize {
        self.bridges.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop a bridge behind the orchestrator's back, as an operator would.
    ///
    /// Returns whether this instance had provisioned it.
    pub fn remove_out_of_band(&self, bridge_name: &str) -> bool {
        self.mark_removed(bridge_name);
        self.bridges
            .write()
            .map(|mut b| b.remove(bridge_name).is_some())
            .unwrap_or(false)
    }

    fn mark_removed(&self, bridge_name: &str) {
        if let Ok(mut removed) = self.removed.write() {
            removed.insert(bridge_name.to_string());
        }
    }
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkProvider for FakeProvider {
    fn kind(&self) -> &'static str {
        "fake"
    }

    #[instrument(skip(self, network), fields(network = %network.name, bridge = %network.bridge_name))]
    async fn create_network(&self, network: &Network) -> Result<Provisioned> {
        if let BackendConfig::Fake(cfg) = &network.backend {
            if cfg.want_fail {
                return Err(NetworkError::ProvisionFailure(
                    "fake network asked to fail".to_string()
                ));
            }
        }

        let mut bridges = self.bridges.write().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;

        let outcome = match bridges.get(&network.bridge_name) {
            Some(existing) if existing == &network.backend => {
                debug!("Fake bridge already exists with matching config");
                Provisioned::AlreadyExisted
            }
            Some(_) => {
                return Err(NetworkError::Conflict(format!(
                    "bridge {} already exists with a different configuration",
                    network.bridge_name
                )));
            }
            None => {
                bridges.insert(network.bridge_name.clone(), network.backend.clone());
                info!("Fake bridge created");
                Provisioned::Created
            }
        };

        if let Ok(mut removed) = self.removed.write() {
            removed.remove(&network.bridge_name);
        }
        Ok(outcome)
    }

    #[instrument(skip(self, network), fields(network = %network.name, bridge = %network.bridge_name))]
    async fn delete_network(&self, network: &Network) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(NetworkError::DeprovisionFailure(
                "fake provider configured to fail deletes".to_string()
            ));
        }

        let mut bridges = self.bridges.write().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;

        if bridges.remove(&network.bridge_name).is_some() {
            info!("Fake bridge deleted");
        } else {
            debug!("Fake bridge already absent");
        }
        drop(bridges);
        self.mark_removed(&network.bridge_name);
        Ok(())
    }

    async fn network_exists(&self, network: &Network) -> Result<bool> {
        let removed = self.removed.read().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;
        Ok(!removed.contains(&network.bridge_name))
    }
}
