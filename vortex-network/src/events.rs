//! Lifecycle event log.
//!
//! In-memory ring buffer of network phase transitions:
//! - Thread-safe access via RwLock
//! - Configurable capacity (default 1000 events)
//! - Newest-first queries, filterable by phase
//!
//! Every pushed event is mirrored to `tracing` at the matching level.

use std::collections::VecDeque;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::types::{Network, NetworkPhase};

/// Maximum number of events to keep in memory
pub const DEFAULT_CAPACITY: usize = 1000;

/// Event severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventLevel::Info => write!(f, "info"),
            EventLevel::Warning => write!(f, "warning"),
            EventLevel::Error => write!(f, "error"),
        }
    }
}

/// A single phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    /// Record ID, if one had been assigned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<Uuid>,
    pub network_name: String,
    pub phase: NetworkPhase,
    pub message: String,
}

impl LifecycleEvent {
    pub fn new(
        level: EventLevel,
        network: &Network,
        phase: NetworkPhase,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            network_id: Some(network.id),
            network_name: network.name.clone(),
            phase,
            message: message.into(),
        }
    }
}

/// Bounded event log.
pub struct EventLog {
    events: RwLock<VecDeque<LifecycleEvent>>,
    capacity: usize,
}

impl EventLog {
    /// Create a new event log with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event log with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Push a new event
    pub fn push(&self, event: LifecycleEvent) {
        match event.level {
            EventLevel::Info => info!(
                network = %event.network_name,
                phase = %event.phase,
                message = %event.message,
                "Network event"
            ),
            EventLevel::Warning => warn!(
                network = %event.network_name,
                phase = %event.phase,
                message = %event.message,
                "Network event"
            ),
            EventLevel::Error => error!(
                network = %event.network_name,
                phase = %event.phase,
                message = %event.message,
                "Network event"
            ),
        }

        if let Ok(mut events) = self.events.write() {
            if events.len() >= self.capacity {
                events.pop_front();
            }
            events.push_back(event);
        }
    }

    /// Events with optional phase filter and limit, newest first
    pub fn query(&self, phase: Option<NetworkPhase>, limit: Option<usize>) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .map(|events| {
                let iter = events
                    .iter()
                    .rev()
                    .filter(|e| phase.map_or(true, |p| e.phase == p))
                    .cloned();
                match limit {
                    Some(limit) => iter.take(limit).collect(),
                    None => iter.collect(),
                }
            })
            .unwrap_or_default()
    }

    /// Events for one network, newest first
    pub fn for_network(&self, network_id: Uuid) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .map(|events| {
                events
                    .iter()
                    .rev()
                    .filter(|e| e.network_id == Some(network_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
