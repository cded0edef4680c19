//! Workload scheduler client.
//!
//! Asks the scheduler which workloads declare a binding to a network:
//!
//! ```text
//! GET {endpoint}/workloads?network=<name>
//! -> { "workloads": [ { "namespace": "...", "name": "...", "phase": "Running" } ] }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use vortex_network::{NetworkError, Result, WorkloadRef, WorkloadSource};

#[derive(Debug, Deserialize)]
struct WorkloadListResponse {
    #[serde(default)]
    workloads: Vec<WorkloadRef>,
}

/// Workload source backed by the scheduler's REST API.
pub struct HttpWorkloadSource {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpWorkloadSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl WorkloadSource for HttpWorkloadSource {
    async fn list_bound_workloads(&self, network_name: &str) -> Result<Vec<WorkloadRef>> {
        let url = format!("{}/workloads", self.endpoint);

        let resp = self
            .http_client
            .get(&url)
            .query(&[("network", network_name)])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %url, "Failed to reach workload scheduler");
                NetworkError::DependencyUnavailable(format!("workload scheduler unreachable: {}", e))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Workload query rejected");
            return Err(NetworkError::DependencyUnavailable(format!(
                "workload scheduler returned {}: {}",
                status, body
            )));
        }

        let list: WorkloadListResponse = resp.json().await.map_err(|e| {
            NetworkError::DependencyUnavailable(format!("invalid workload list: {}", e))
        })?;

        let workloads: Vec<WorkloadRef> = list
            .workloads
            .into_iter()
            .filter(|w| !w.phase.is_terminal())
            .collect();

        debug!(network = %network_name, count = workloads.len(), "Workloads fetched");
        Ok(workloads)
    }
}
