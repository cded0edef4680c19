//! Network usage tracking.
//!
//! Answers "is any running workload bound to this network?" by asking the
//! workload collaborator on every call. Nothing is cached, and a collaborator
//! failure is an error, never a "not in use".

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{NetworkError, Result};

/// Workload phase as reported by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl WorkloadPhase {
    /// Whether the workload has finished for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkloadPhase::Succeeded | WorkloadPhase::Failed)
    }
}

/// A workload that declares a binding to a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub phase: WorkloadPhase,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, phase: WorkloadPhase) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            phase,
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The external system that knows which workloads are bound to which network.
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    /// List non-terminal workloads that declare a binding to `network_name`.
    async fn list_bound_workloads(&self, network_name: &str) -> Result<Vec<WorkloadRef>>;
}

/// Usage tracker over a workload source.
#[derive(Clone)]
pub struct UsageTracker {
    source: Arc<dyn WorkloadSource>,
    timeout: Option<Duration>,
}

impl UsageTracker {
    pub fn new(source: Arc<dyn WorkloadSource>) -> Self {
        Self {
            source,
            timeout: None,
        }
    }

    /// Bound each query to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Workloads currently bound to a network.
    #[instrument(skip(self))]
    pub async fn bound_workloads(&self, network_name: &str) -> Result<Vec<WorkloadRef>> {
        let query = self.source.list_bound_workloads(network_name);
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, query).await.map_err(|_| {
                NetworkError::DependencyUnavailable(format!(
                    "workload query for {} timed out after {:?}",
                    network_name, timeout
                ))
            })?,
            None => query.await,
        };

        let workloads = result.map_err(|e| match e {
            NetworkError::DependencyUnavailable(_) => e,
            other => NetworkError::DependencyUnavailable(format!("workload query failed: {}", other)),
        })?;

        // Sources are expected to filter, but a terminal workload must never block a delete.
        let workloads: Vec<WorkloadRef> = workloads
            .into_iter()
            .filter(|w| !w.phase.is_terminal())
            .collect();

        debug!(count = workloads.len(), "Bound workloads queried");
        Ok(workloads)
    }

    /// Check whether any running workload is bound to a network.
    pub async fn in_use(&self, network_name: &str) -> Result<bool> {
        Ok(!self.bound_workloads(network_name).await?.is_empty())
    }
}

/// In-memory workload source for tests and development.
#[derive(Default)]
pub struct StaticWorkloads {
    /// network name -> bound workloads
    bindings: RwLock<HashMap<String, Vec<WorkloadRef>>>,
    unreachable: AtomicBool,
}

impl StaticWorkloads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a workload to a network.
    pub fn attach(&self, network_name: &str, workload: WorkloadRef) {
        if let Ok(mut bindings) = self.bindings.write() {
            let list = bindings.entry(network_name.to_string()).or_default();
            list.retain(|w| w.namespace != workload.namespace || w.name != workload.name);
            list.push(workload);
        }
    }

    /// Remove a workload binding.
    pub fn detach(&self, network_name: &str, namespace: &str, name: &str) {
        if let Ok(mut bindings) = self.bindings.write() {
            if let Some(list) = bindings.get_mut(network_name) {
                list.retain(|w| w.namespace != namespace || w.name != name);
            }
        }
    }

    /// Update the phase of a bound workload.
    pub fn set_phase(&self, network_name: &str, namespace: &str, name: &str, phase: WorkloadPhase) {
        if let Ok(mut bindings) = self.bindings.write() {
            if let Some(list) = bindings.get_mut(network_name) {
                for w in list.iter_mut().filter(|w| w.namespace == namespace && w.name == name) {
                    w.phase = phase;
                }
            }
        }
    }

    /// Simulate the scheduler being unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkloadSource for StaticWorkloads {
    async fn list_bound_workloads(&self, network_name: &str) -> Result<Vec<WorkloadRef>> {
        if self.unreachable.load(Ordering::SeqCst) {
            warn!("Static workload source marked unreachable");
            return Err(NetworkError::DependencyUnavailable(
                "workload source unreachable".to_string()
            ));
        }

        let bindings = self.bindings.read().map_err(|_| {
            NetworkError::Internal("Lock poisoned".to_string())
        })?;

        Ok(bindings
            .get(network_name)
            .map(|list| list.iter().filter(|w| !w.phase.is_terminal()).cloned().collect())
            .unwrap_or_default())
    }
}
