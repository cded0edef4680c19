//! Durable network records.
//!
//! The store is the single serialization point for concurrent creates: a
//! unique index on `name` makes the losing insert fail with `Conflict`.

mod memory;

pub use memory::MemoryStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{NetworkError, Result};
use crate::types::Network;

/// Record fields that can carry a unique index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    Name,
    BridgeName,
}

impl IndexField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexField::Name => "name",
            IndexField::BridgeName => "bridgeName",
        }
    }

    /// Value of this field in a record.
    pub fn value<'a>(&self, network: &'a Network) -> &'a str {
        match self {
            IndexField::Name => &network.name,
            IndexField::BridgeName => &network.bridge_name,
        }
    }
}

impl fmt::Display for IndexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexField {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(IndexField::Name),
            "bridgeName" | "bridge_name" => Ok(IndexField::BridgeName),
            other => Err(NetworkError::Internal(format!("cannot index field {}", other))),
        }
    }
}

/// Record store trait.
#[async_trait]
pub trait NetworkStore: Send + Sync {
    /// Enforce uniqueness of a field for all subsequent inserts.
    ///
    /// Idempotent; called once at startup.
    async fn ensure_unique_index(&self, field: IndexField) -> Result<()>;

    /// Insert a new record.
    ///
    /// Fails with `Conflict` if a unique field collides with an existing record.
    async fn insert(&self, network: &Network) -> Result<()>;

    /// Load a record by ID, `NotFound` if absent.
    async fn find_by_id(&self, id: Uuid) -> Result<Network>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<Network>>;

    /// Remove a record by ID, `NotFound` if absent.
    async fn remove(&self, id: Uuid) -> Result<()>;
}
