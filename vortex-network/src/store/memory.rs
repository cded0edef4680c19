//! In-memory record store with optional JSON persistence.
//!
//! When a persistence path is set, the full record set is rewritten after
//! every mutation (write to a temp file, then rename). A mutation whose write
//! fails is undone in memory, so memory and disk never disagree.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{NetworkError, Result};
use crate::types::Network;
use super::{IndexField, NetworkStore};

/// In-memory store.
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, Network>>,
    unique: RwLock<HashSet<IndexField>>,
    /// Path for optional persistence
    persistence_path: Option<PathBuf>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create a new, non-persistent store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            unique: RwLock::new(HashSet::new()),
            persistence_path: None,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Open a store persisted at `path`, loading existing records.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = load_records(&path).await?;

        info!(path = %path.display(), count = records.len(), "Network store opened");

        Ok(Self {
            records: RwLock::new(records),
            unique: RwLock::new(HashSet::new()),
            persistence_path: Some(path),
            unavailable: AtomicBool::new(false),
        })
    }

    /// Simulate the store being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NetworkError::DependencyUnavailable(
                "network store unavailable".to_string()
            ));
        }
        Ok(())
    }

    async fn persist(&self, records: &HashMap<Uuid, Network>) -> Result<()> {
        let path = match &self.persistence_path {
            Some(p) => p,
            None => return Ok(()),
        };

        let mut list: Vec<&Network> = records.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let json = serde_json::to_vec_pretty(&list)
            .map_err(|e| NetworkError::Internal(format!("Failed to encode records: {}", e)))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                NetworkError::DependencyUnavailable(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            NetworkError::DependencyUnavailable(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            NetworkError::DependencyUnavailable(format!("Failed to replace {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), count = list.len(), "Network records saved");
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn load_records(path: &Path) -> Result<HashMap<Uuid, Network>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(HashMap::new());
    }

    let json = tokio::fs::read(path).await.map_err(|e| {
        NetworkError::DependencyUnavailable(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let list: Vec<Network> = serde_json::from_slice(&json).map_err(|e| {
        NetworkError::Internal(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    Ok(list.into_iter().map(|n| (n.id, n)).collect())
}

#[async_trait]
impl NetworkStore for MemoryStore {
    async fn ensure_unique_index(&self, field: IndexField) -> Result<()> {
        self.check_available()?;

        let records = self.records.read().await;
        let mut seen = HashSet::new();
        for network in records.values() {
            if !seen.insert(field.value(network)) {
                return Err(NetworkError::Conflict(format!(
                    "cannot build unique index on {}: duplicate value {}",
                    field,
                    field.value(network)
                )));
            }
        }

        if self.unique.write().await.insert(field) {
            info!(field = %field, "Unique index ensured");
        }
        Ok(())
    }

    #[instrument(skip(self, network), fields(network = %network.name, id = %network.id))]
    async fn insert(&self, network: &Network) -> Result<()> {
        self.check_available()?;

        let unique = self.unique.read().await.clone();
        let mut records = self.records.write().await;

        if records.contains_key(&network.id) {
            return Err(NetworkError::Conflict(format!("network id {} already exists", network.id)));
        }
        for field in &unique {
            let value = field.value(network);
            if records.values().any(|existing| field.value(existing) == value) {
                return Err(NetworkError::Conflict(format!(
                    "network {}: {} already exists",
                    field, value
                )));
            }
        }

        records.insert(network.id, network.clone());
        if let Err(e) = self.persist(&records).await {
            records.remove(&network.id);
            return Err(e);
        }

        debug!("Network record inserted");
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Network> {
        self.check_available()?;

        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| NetworkError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Network>> {
        self.check_available()?;

        let mut list: Vec<Network> = self.records.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: Uuid) -> Result<()> {
        self.check_available()?;

        let mut records = self.records.write().await;
        let removed = records
            .remove(&id)
            .ok_or_else(|| NetworkError::NotFound(id.to_string()))?;

        if let Err(e) = self.persist(&records).await {
            records.insert(id, removed);
            return Err(e);
        }

        debug!("Network record removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NetworkSpec;

    #[tokio::test]
    async fn test_unique_name() {
        let store = MemoryStore::new();
        store.ensure_unique_index(IndexField::Name).await.unwrap();

        let a = Network::from_spec(NetworkSpec::fake("net-a"), "owner");
        let b = Network::from_spec(NetworkSpec::bridge("net-a", vec![]), "owner");

        store.insert(&a).await.unwrap();
        assert!(matches!(store.insert(&b).await, Err(NetworkError::Conflict(_))));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_index_is_idempotent() {
        let store = MemoryStore::new();
        store.ensure_unique_index(IndexField::Name).await.unwrap();
        store.ensure_unique_index(IndexField::Name).await.unwrap();
        assert!("ports".parse::<IndexField>().is_err());
    }

    #[tokio::test]
    async fn test_find_and_remove() {
        let store = MemoryStore::new();
        let net = Network::from_spec(NetworkSpec::fake("net-a"), "owner");
        store.insert(&net).await.unwrap();

        assert_eq!(store.find_by_id(net.id).await.unwrap(), net);

        store.remove(net.id).await.unwrap();
        assert!(store.find_by_id(net.id).await.unwrap_err().is_not_found());
        assert!(store.remove(net.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let net = Network::from_spec(NetworkSpec::fake("net-a"), "owner");

        assert!(matches!(
            store.insert(&net).await,
            Err(NetworkError::DependencyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("networks.json");

        let net = Network::from_spec(NetworkSpec::fake("net-a"), "owner");
        {
            let store = MemoryStore::open(&path).await.unwrap();
            store.insert(&net).await.unwrap();
        }

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.find_by_id(net.id).await.unwrap(), net);

        reopened.remove(net.id).await.unwrap();
        let again = MemoryStore::open(&path).await.unwrap();
        assert!(again.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_rejects_existing_duplicates() {
        let store = MemoryStore::new();
        store.insert(&Network::from_spec(NetworkSpec::fake("dup"), "o")).await.unwrap();
        store.insert(&Network::from_spec(NetworkSpec::fake("dup"), "o")).await.unwrap();

        assert!(matches!(
            store.ensure_unique_index(IndexField::Name).await,
            Err(NetworkError::Conflict(_))
        ));
    }
}
