//! In-memory host storage.

use std::{collections::BTreeMap, sync::RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetwatch_core::{HostId, HostRecord, HostStore, StoreError};

/// In-memory storage implementation.
///
/// Useful for development and tests.
/// Data is lost on restart.
pub struct MemoryHostStore {
    hosts: RwLock<BTreeMap<HostId, HostRecord>>,
}

impl MemoryHostStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hosts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a store holding `hosts`.
    #[must_use]
    pub fn with_hosts(hosts: impl IntoIterator<Item = HostRecord>) -> Self {
        Self {
            hosts: RwLock::new(hosts.into_iter().map(|h| (h.id, h)).collect()),
        }
    }

    /// Insert or replace a host.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn insert(&self, host: HostRecord) -> Result<(), StoreError> {
        self.hosts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(host.id, host);
        Ok(())
    }

    /// Remove a host, returning it if present.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn remove(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        Ok(self
            .hosts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .remove(&id))
    }
}

impl Default for MemoryHostStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostStore for MemoryHostStore {
    async fn get(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        Ok(self
            .hosts
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(&id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<HostRecord>, StoreError> {
        Ok(self
            .hosts
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .values()
            .cloned()
            .collect())
    }

    async fn set_last_update(&self, id: HostId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut hosts = self
            .hosts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let host = hosts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        host.last_update = Some(at);

        Ok(())
    }

    async fn record_commit(&self, hash: &str, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut hosts = self
            .hosts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        for host in hosts.values_mut() {
            host.commit_hash = Some(hash.to_string());
            host.last_commit = Some(at);
        }

        Ok(hosts.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_last_update() {
        let store = MemoryHostStore::with_hosts([HostRecord::new(1, "a", "10.0.0.1", 22)]);
        let at = Utc::now();

        store.set_last_update(1, at).await.unwrap();
        assert_eq!(store.get(1).await.unwrap().unwrap().last_update, Some(at));

        let err = store.set_last_update(2, at).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(2)));
    }

    #[tokio::test]
    async fn test_record_commit_stamps_every_host() {
        let store = MemoryHostStore::with_hosts([
            HostRecord::new(2, "b", "10.0.0.2", 22),
            HostRecord::new(1, "a", "10.0.0.1", 22),
        ]);
        let at = Utc::now();

        assert_eq!(store.record_commit("deadbeef", at).await.unwrap(), 2);

        let hosts = store.list().await.unwrap();
        assert_eq!(hosts.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(hosts.iter().all(|h| h.commit_hash.as_deref() == Some("deadbeef")));
        assert!(hosts.iter().all(|h| h.last_commit == Some(at)));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryHostStore::new();
        tokio_test::assert_ok!(store.insert(HostRecord::new(5, "e", "10.0.0.5", 22)));
        assert!(tokio_test::assert_ok!(store.remove(5)).is_some());
        assert!(store.get(5).await.unwrap().is_none());
    }
}
