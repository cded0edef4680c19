//! # Vortex Network
//!
//! Lifecycle management for tenant networks.
//!
//! A network is a named, typed isolation domain backed by a host bridge:
//! - **bridge** - Linux kernel bridge
//! - **system** - Open vSwitch, kernel datapath
//! - **netdev** - Open vSwitch, userspace datapath
//! - **fake** - bookkeeping only
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             NetworkOrchestrator             │
//! │  (create, delete, status, reconcile)        │
//! └──────┬──────────────┬──────────────┬────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ProviderRegis-│ │ NetworkStore │ │ UsageTracker │
//! │try (by type) │ │ (unique name)│ │ (workloads)  │
//! └──────┬───────┘ └──────────────┘ └──────────────┘
//!        │
//!   ┌────┴──────────────┬─────────────────┐
//!   ▼                   ▼                 ▼
//! LinuxBridgeProvider  OvsProvider     FakeProvider
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vortex_network::{
//!     FakeProvider, MemoryStore, NetworkOrchestrator, NetworkSpec,
//!     ProviderRegistry, StaticWorkloads, UsageTracker,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = NetworkOrchestrator::new(
//!         ProviderRegistry::fake_only(Arc::new(FakeProvider::new())),
//!         Arc::new(MemoryStore::new()),
//!         UsageTracker::new(Arc::new(StaticWorkloads::new())),
//!     );
//!     orchestrator.init().await.unwrap();
//!
//!     let net = orchestrator
//!         .create_network(NetworkSpec::bridge("tenant-a-net", vec![]), "user-1")
//!         .await
//!         .unwrap();
//!     orchestrator.delete_network(net.id).await.unwrap();
//! }
//! ```

pub mod error;
pub mod events;
pub mod naming;
pub mod orchestrator;
pub mod provider;
pub mod selector;
pub mod store;
pub mod types;
pub mod usage;

pub use error::{ErrorKind, NetworkError, Result};
pub use events::{EventLevel, EventLog, LifecycleEvent};
pub use naming::generate_bridge_name;
pub use orchestrator::{NetworkOrchestrator, OrchestratorConfig, ReconcileReport};
pub use provider::{
    CommandOutput,
    CommandRunner,
    FakeProvider,
    LinuxBridgeProvider,
    NetworkProvider,
    OvsProvider,
    Provisioned,
    SystemCommandRunner,
};
pub use selector::ProviderRegistry;
pub use store::{IndexField, MemoryStore, NetworkStore};
pub use types::*;
pub use usage::{StaticWorkloads, UsageTracker, WorkloadPhase, WorkloadRef, WorkloadSource};
