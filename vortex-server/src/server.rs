//! Service wiring and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use vortex_network::{
    EventLog, FakeProvider, MemoryStore, NetworkOrchestrator, NetworkStore, OrchestratorConfig,
    ProviderRegistry, StaticWorkloads, SystemCommandRunner, UsageTracker, WorkloadSource,
};

use crate::config::Config;
use crate::http::{build_router, AppState};
use crate::workloads::HttpWorkloadSource;

/// Build the provider registry described by the configuration.
pub fn build_registry(config: &Config) -> ProviderRegistry {
    let mut registry = if config.providers.dev {
        info!("Development mode, using fake provider for every network type");
        ProviderRegistry::fake_only(Arc::new(FakeProvider::new()))
    } else {
        let runner = Arc::new(SystemCommandRunner::with_timeout(config.providers.command_timeout()));
        ProviderRegistry::with_command_runner(runner)
    };

    registry.retain(&config.providers.enabled);
    registry
}

/// Orchestrator bounds derived from the configuration.
///
/// `command_timeout_secs` bounds each command inside the runner, where a
/// timed-out create still rolls back. No outer provider timeout is set: it
/// would drop a multi-command create between steps.
pub fn orchestrator_config(_config: &Config) -> OrchestratorConfig {
    OrchestratorConfig {
        provider_timeout: None,
        store_timeout: None,
    }
}

/// Build the orchestrator and its collaborators.
pub async fn build_orchestrator(config: &Config, events: Arc<EventLog>) -> Result<NetworkOrchestrator> {
    let registry = build_registry(config);

    let store: Arc<dyn NetworkStore> = match &config.store.path {
        Some(path) => Arc::new(
            MemoryStore::open(path)
                .await
                .with_context(|| format!("Failed to open network store at {}", path))?,
        ),
        None => {
            warn!("No store path configured, network records will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let source: Arc<dyn WorkloadSource> = match &config.workloads.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "Using workload scheduler");
            Arc::new(HttpWorkloadSource::new(endpoint.clone(), config.workloads.timeout())?)
        }
        None => {
            warn!("No workload endpoint configured, every network will be reported unused");
            Arc::new(StaticWorkloads::new())
        }
    };
    let usage = UsageTracker::new(source).with_timeout(config.workloads.timeout());

    let orchestrator = NetworkOrchestrator::new(registry, store, usage)
        .with_config(orchestrator_config(config))
        .with_events(events);

    orchestrator
        .init()
        .await
        .context("Failed to initialize network orchestrator")?;

    Ok(orchestrator)
}

/// Run the service until the listener fails.
pub async fn run(config: Config) -> Result<()> {
    let events = Arc::new(EventLog::new());
    let orchestrator = Arc::new(build_orchestrator(&config, events.clone()).await?);

    if let Some(interval) = config.reconcile.interval() {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Starting reconciliation loop");
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = orchestrator.reconcile().await {
                    error!(error = %e, "Reconciliation pass failed");
                }
            }
        });
    }

    let addr: SocketAddr = config
        .server
        .listen_address
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.server.listen_address))?;

    let app = build_router(Arc::new(AppState { orchestrator, events }));

    info!(address = %addr, "Starting REST API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
