use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{SecretRecord, SecretStore, StoreError};

/// In-memory store behind a single mutex. Used by tests and by hosts
/// that want secrets to vanish on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, SecretRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unread secrets.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.inner
            .lock()
            .map(|m| m.contains_key(alias))
            .unwrap_or(false)
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("memory store lock poisoned: {e}"))
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn insert(&self, record: SecretRecord) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(poisoned)?;
        match map.entry(record.alias.clone()) {
            Entry::Occupied(e) => Err(StoreError::AliasCollision(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(record);
                Ok(())
            }
        }
    }

    async fn fetch_and_delete(&self, alias: &str) -> Result<SecretRecord, StoreError> {
        let mut map = self.inner.lock().map_err(poisoned)?;
        map.remove(alias)
            .ok_or_else(|| StoreError::NotFound(alias.to_owned()))
    }
}
