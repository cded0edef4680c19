//! Network lifecycle orchestration.
//!
//! ## Create
//!
//! ```text
//! validate ─▶ select provider ─▶ provider.create ─▶ store.insert ─▶ Active
//!                                     │                  │
//!                                     ▼                  ▼
//!                              ProvisionFailed    compensating delete
//!                              (nothing stored)   (only of a bridge this call
//!                                                  created and no live record
//!                                                  owns)
//! ```
//!
//! The store's unique index on `name` is what serializes concurrent creates;
//! there is no pre-check. The losing side undoes its provisioning. A bridge
//! the provider reported as already there is never deleted, and neither is
//! one whose ownership cannot be checked: that case surfaces as
//! `CompensationFailed` so an operator can decide.
//!
//! ## Delete
//!
//! ```text
//! find ─▶ usage check ─▶ select provider ─▶ provider.delete ─▶ store.remove
//!              │
//!              ▼
//!         DeleteBlocked (InUse / DependencyUnavailable)
//! ```
//!
//! Every step after the usage check is idempotent, so re-running delete on a
//! record whose bridge is already gone is how reconciliation repairs drift.
//! A workload may still attach between the usage check and the teardown; the
//! scheduler offers no lock to close that window.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{NetworkError, Result};
use crate::events::{EventLevel, EventLog, LifecycleEvent};
use crate::provider::{NetworkProvider, Provisioned};
use crate::selector::ProviderRegistry;
use crate::store::{IndexField, NetworkStore};
use crate::types::{Network, NetworkPhase, NetworkSpec};
use crate::usage::UsageTracker;

/// Caller-chosen bounds on the slow steps.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Bound on each provider create/delete/exists call.
    ///
    /// A call that runs over is dropped where it stands, which can leave a
    /// create half applied. It must cover every command of a provider
    /// operation, not just one.
    pub provider_timeout: Option<Duration>,
    /// Bound on each record store call
    pub store_timeout: Option<Duration>,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Records examined
    pub checked: usize,
    /// Stale records removed (bridge was already gone)
    pub removed: Vec<String>,
    /// Stale records kept because workloads are still bound
    pub blocked: Vec<String>,
    /// Records that could not be checked or cleaned up
    pub failed: Vec<String>,
}

/// The lifecycle orchestrator.
pub struct NetworkOrchestrator {
    registry: ProviderRegistry,
    store: Arc<dyn NetworkStore>,
    usage: UsageTracker,
    config: OrchestratorConfig,
    events: Option<Arc<EventLog>>,
}

impl NetworkOrchestrator {
    pub fn new(registry: ProviderRegistry, store: Arc<dyn NetworkStore>, usage: UsageTracker) -> Self {
        Self {
            registry,
            store,
            usage,
            config: OrchestratorConfig::default(),
            events: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Record phase transitions in `events`.
    pub fn with_events(mut self, events: Arc<EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn events(&self) -> Option<&Arc<EventLog>> {
        self.events.as_ref()
    }

    /// Prepare the store. Must be called once before serving requests.
    pub async fn init(&self) -> Result<()> {
        self.store_call(self.store.ensure_unique_index(IndexField::Name)).await?;
        self.store_call(self.store.ensure_unique_index(IndexField::BridgeName)).await?;
        info!(
            types = ?self.registry.supported_types(),
            "Network orchestrator initialized"
        );
        Ok(())
    }

    /// Provision and persist a new network.
    #[instrument(skip(self, spec), fields(network = %spec.name, network_type = %spec.network_type()))]
    pub async fn create_network(&self, spec: NetworkSpec, owner_id: &str) -> Result<Network> {
        let mut network = Network::from_spec(spec.clone(), owner_id);
        self.emit(EventLevel::Info, &network, NetworkPhase::Requested, "Network requested");

        if let Err(e) = spec.validate() {
            self.emit(EventLevel::Warning, &network, NetworkPhase::ProvisionFailed, e.to_string());
            return Err(e);
        }

        let provider = match self.registry.select(network.network_type()) {
            Ok(p) => p,
            Err(e) => {
                self.emit(EventLevel::Warning, &network, NetworkPhase::ProvisionFailed, e.to_string());
                return Err(e);
            }
        };

        network.phase = NetworkPhase::Provisioning;
        self.emit(
            EventLevel::Info,
            &network,
            NetworkPhase::Provisioning,
            format!("Provisioning bridge {} with {}", network.bridge_name, provider.kind()),
        );

        let outcome = match self
            .provider_call(provider.create_network(&network), NetworkError::ProvisionFailure)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.emit(EventLevel::Error, &network, NetworkPhase::ProvisionFailed, e.to_string());
                return Err(e);
            }
        };

        // A bridge this call created must be undone if the future is dropped.
        let guard = (outcome == Provisioned::Created)
            .then(|| CompensationGuard::arm(provider.clone(), self.store.clone(), network.clone()));

        network.phase = NetworkPhase::Active;
        let persisted = self.store_call(self.store.insert(&network)).await;
        if let Some(guard) = guard {
            guard.disarm();
        }

        match persisted {
            Ok(()) => {
                self.emit(EventLevel::Info, &network, NetworkPhase::Active, "Network active");
                Ok(network)
            }
            Err(primary) => {
                network.phase = NetworkPhase::ProvisionFailed;
                Err(self.compensate(provider.as_ref(), &network, outcome, primary).await)
            }
        }
    }

    /// Undo a provisioning whose record could not be persisted.
    ///
    /// Returns the error to surface: the primary one, or a compensation
    /// failure wrapping it.
    async fn compensate(
        &self,
        provider: &dyn NetworkProvider,
        network: &Network,
        outcome: Provisioned,
        primary: NetworkError,
    ) -> NetworkError {
        warn!(
            bridge = %network.bridge_name,
            error = %primary,
            "Persisting network failed, compensating"
        );

        if outcome == Provisioned::AlreadyExisted {
            info!(bridge = %network.bridge_name, "Bridge predates this request, leaving it in place");
            self.emit(EventLevel::Warning, network, NetworkPhase::ProvisionFailed, primary.to_string());
            return primary;
        }

        match self.bridge_owned_elsewhere(network).await {
            Ok(true) => {
                // Same name and type as a live network: the bridge is theirs.
                info!(bridge = %network.bridge_name, "Bridge belongs to an existing network, leaving it in place");
                self.emit(EventLevel::Warning, network, NetworkPhase::ProvisionFailed, primary.to_string());
                return primary;
            }
            Ok(false) => {}
            Err(e) => {
                // Ownership unknown, the bridge stays for an operator to judge.
                return self.compensation_failed(network, primary, e);
            }
        }

        let undone = self
            .provider_call(provider.delete_network(network), NetworkError::DeprovisionFailure)
            .await;

        match undone {
            Ok(()) => {
                self.emit(
                    EventLevel::Warning,
                    network,
                    NetworkPhase::ProvisionFailed,
                    format!("{} (bridge {} rolled back)", primary, network.bridge_name),
                );
                primary
            }
            Err(e) => self.compensation_failed(network, primary, e),
        }
    }

    fn compensation_failed(&self, network: &Network, primary: NetworkError, compensation: NetworkError) -> NetworkError {
        let err = NetworkError::CompensationFailed {
            primary: Box::new(primary),
            compensation: Box::new(compensation),
            bridge_name: network.bridge_name.clone(),
        };
        error!(
            bridge = %network.bridge_name,
            error = %err,
            "Compensation failed, bridge may be orphaned and needs manual cleanup"
        );
        self.emit(EventLevel::Error, network, NetworkPhase::ProvisionFailed, err.to_string());
        err
    }

    async fn bridge_owned_elsewhere(&self, network: &Network) -> Result<bool> {
        let records = self.store_call(self.store.list()).await?;
        Ok(records
            .iter()
            .any(|n| n.bridge_name == network.bridge_name && n.id != network.id))
    }

    /// Tear down and forget a network, unless workloads are still bound to it.
    #[instrument(skip(self), fields(network_id = %id))]
    pub async fn delete_network(&self, id: Uuid) -> Result<()> {
        let mut network = self.store_call(self.store.find_by_id(id)).await?;

        let workloads = match self.usage.bound_workloads(&network.name).await {
            Ok(w) => w,
            Err(e) => {
                self.emit(EventLevel::Warning, &network, NetworkPhase::DeleteBlocked, e.to_string());
                return Err(e);
            }
        };
        if !workloads.is_empty() {
            let err = NetworkError::InUse {
                network: network.name.clone(),
                workloads: workloads.iter().map(|w| w.to_string()).collect(),
            };
            self.emit(EventLevel::Warning, &network, NetworkPhase::DeleteBlocked, err.to_string());
            return Err(err);
        }

        network.phase = NetworkPhase::PendingDeletion;
        self.emit(
            EventLevel::Info,
            &network,
            NetworkPhase::PendingDeletion,
            format!("Deprovisioning bridge {}", network.bridge_name),
        );

        let provider = self.registry.select(network.network_type())?;
        if let Err(e) = self
            .provider_call(provider.delete_network(&network), NetworkError::DeprovisionFailure)
            .await
        {
            self.emit(EventLevel::Error, &network, NetworkPhase::PendingDeletion, e.to_string());
            return Err(e);
        }

        match self.store_call(self.store.remove(id)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Record already removed");
            }
            Err(e) => {
                self.emit(EventLevel::Error, &network, NetworkPhase::PendingDeletion, e.to_string());
                return Err(e);
            }
        }

        network.phase = NetworkPhase::Deleted;
        self.emit(EventLevel::Info, &network, NetworkPhase::Deleted, "Network deleted");
        Ok(())
    }

    /// Load one network record.
    pub async fn get_network(&self, id: Uuid) -> Result<Network> {
        self.store_call(self.store.find_by_id(id)).await
    }

    /// All network records, oldest first.
    pub async fn list_networks(&self) -> Result<Vec<Network>> {
        self.store_call(self.store.list()).await
    }

    /// Workloads currently bound to a network, as `namespace/name`.
    pub async fn network_status(&self, id: Uuid) -> Result<Vec<String>> {
        let network = self.store_call(self.store.find_by_id(id)).await?;
        let workloads = self.usage.bound_workloads(&network.name).await?;
        Ok(workloads.iter().map(|w| w.to_string()).collect())
    }

    /// Re-run the delete protocol for every record whose bridge no longer exists.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let records = self.store_call(self.store.list()).await?;
        let mut report = ReconcileReport::default();

        for network in records {
            report.checked += 1;

            let provider = match self.registry.select(network.network_type()) {
                Ok(p) => p,
                Err(e) => {
                    report.failed.push(format!("{}: {}", network.name, e));
                    continue;
                }
            };

            let exists = self
                .provider_call(provider.network_exists(&network), NetworkError::DependencyUnavailable)
                .await;
            match exists {
                Ok(true) => continue,
                Ok(false) => {
                    warn!(network = %network.name, bridge = %network.bridge_name, "Bridge missing for stored network");
                }
                Err(e) => {
                    report.failed.push(format!("{}: {}", network.name, e));
                    continue;
                }
            }

            match self.delete_network(network.id).await {
                Ok(()) => report.removed.push(network.name),
                Err(NetworkError::NotFound(_)) => {}
                Err(e @ NetworkError::InUse { .. }) => {
                    debug!(error = %e, "Stale network still in use");
                    report.blocked.push(network.name);
                }
                Err(e) => report.failed.push(format!("{}: {}", network.name, e)),
            }
        }

        info!(
            checked = report.checked,
            removed = report.removed.len(),
            blocked = report.blocked.len(),
            failed = report.failed.len(),
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    fn emit(&self, level: EventLevel, network: &Network, phase: NetworkPhase, message: impl Into<String>) {
        let message: String = message.into();
        match &self.events {
            Some(events) => events.push(LifecycleEvent::new(level, network, phase, message)),
            None => debug!(network = %network.name, phase = %phase, message = %message, "Phase transition"),
        }
    }

    async fn provider_call<T>(
        &self,
        call: impl Future<Output = Result<T>>,
        on_timeout: fn(String) -> NetworkError,
    ) -> Result<T> {
        bounded(self.config.provider_timeout, call, on_timeout, "provider call").await
    }

    async fn store_call<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        bounded(
            self.config.store_timeout,
            call,
            NetworkError::DependencyUnavailable,
            "store call",
        )
        .await
    }
}

async fn bounded<T>(
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T>>,
    on_timeout: fn(String) -> NetworkError,
    what: &str,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(on_timeout(format!("{} timed out after {:?}", what, limit)))),
        None => call.await,
    }
}

/// Undoes a provisioning if the create future is dropped before the record
/// is persisted.
struct CompensationGuard {
    armed: Option<(Arc<dyn NetworkProvider>, Arc<dyn NetworkStore>, Network)>,
}

impl CompensationGuard {
    fn arm(provider: Arc<dyn NetworkProvider>, store: Arc<dyn NetworkStore>, network: Network) -> Self {
        Self {
            armed: Some((provider, store, network)),
        }
    }

    fn disarm(mut self) {
        self.armed = None;
    }
}

impl Drop for CompensationGuard {
    fn drop(&mut self) {
        let Some((provider, store, network)) = self.armed.take() else {
            return;
        };

        warn!(bridge = %network.bridge_name, "Create cancelled after provisioning, compensating");

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                error!(bridge = %network.bridge_name, "No runtime to compensate on, bridge may be orphaned");
                return;
            }
        };

        handle.spawn(async move {
            // The insert may have landed before the cancellation.
            match store.find_by_id(network.id).await {
                Ok(_) => {
                    debug!(bridge = %network.bridge_name, "Record was persisted, keeping bridge");
                    return;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(bridge = %network.bridge_name, error = %e, "Cannot check cancelled create, bridge may be orphaned");
                    return;
                }
            }
            match store.list().await {
                Ok(records) if records.iter().any(|n| n.bridge_name == network.bridge_name) => return,
                Ok(_) => {}
                Err(e) => {
                    error!(bridge = %network.bridge_name, error = %e, "Cannot check cancelled create, bridge may be orphaned");
                    return;
                }
            }
            match provider.delete_network(&network).await {
                Ok(()) => info!(bridge = %network.bridge_name, "Cancelled create rolled back"),
                Err(e) => error!(
                    bridge = %network.bridge_name,
                    error = %e,
                    "Failed to roll back cancelled create, bridge may be orphaned"
                ),
            }
        });
    }
}
