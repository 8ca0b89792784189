//! Long-term facts about users, kept in a key/value fact store.
//!
//! Keys:
//! - `memory_<userId>` holds a JSON [`UserMemory`]
//! - `prompt_rails` holds the raw rails template

use crate::error::StoreError;
use crate::persona::DEFAULT_RAILS;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

pub const RAILS_KEY: &str = "prompt_rails";

pub fn memory_key(user_id: u64) -> String {
    format!("memory_{}", user_id)
}

/// Durable string-to-string mapping.
#[async_trait]
pub trait FactStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Every stored key starting with `prefix`, in no particular order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Process-lifetime store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    data: DashMap<String, String>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMemory {
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Forgotten {
    Fact(String),
    /// Index outside `1..=facts.len()`. Nothing changed.
    NoSuchFact,
}

/// Typed access to user memories and the rails template.
///
/// Writes to one user's memory are serialised through a per-user lock and
/// always re-read the record right before writing it back.
pub struct MemoryBook {
    store: Arc<dyn FactStore>,
    timeout: Duration,
    write_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl MemoryBook {
    pub fn new(store: Arc<dyn FactStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            write_locks: DashMap::new(),
        }
    }

    pub async fn load(&self, user_id: u64) -> Result<UserMemory, StoreError> {
        let key = memory_key(user_id);
        match self.bounded(self.store.get(&key)).await? {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt { key, source })
            }
            None => Ok(UserMemory::default()),
        }
    }

    /// Appends a fact and returns the new fact count.
    pub async fn append_fact(&self, user_id: u64, fact: String) -> Result<usize, StoreError> {
        let _guard = self.write_lock(user_id).await;

        let mut memory = self.load(user_id).await?;
        memory.facts.push(fact);
        self.save(user_id, &memory).await?;

        debug!(user_id, total = memory.facts.len(), "fact stored");
        Ok(memory.facts.len())
    }

    /// Removes the fact at 1-based `position`.
    pub async fn remove_fact(&self, user_id: u64, position: usize) -> Result<Forgotten, StoreError> {
        let _guard = self.write_lock(user_id).await;

        let mut memory = self.load(user_id).await?;
        if position == 0 || position > memory.facts.len() {
            return Ok(Forgotten::NoSuchFact);
        }

        let fact = memory.facts.remove(position - 1);
        self.save(user_id, &memory).await?;
        Ok(Forgotten::Fact(fact))
    }

    pub async fn wipe(&self, user_id: u64) -> Result<(), StoreError> {
        let _guard = self.write_lock(user_id).await;

        self.bounded(self.store.delete(&memory_key(user_id))).await?;
        info!(user_id, "memory wiped");
        Ok(())
    }

    /// The stored rails template, or the built-in default when none is stored.
    pub async fn rails(&self) -> Result<String, StoreError> {
        Ok(self
            .bounded(self.store.get(RAILS_KEY))
            .await?
            .unwrap_or_else(|| DEFAULT_RAILS.to_string()))
    }

    pub async fn install_default_rails(&self) -> Result<(), StoreError> {
        self.bounded(self.store.set(RAILS_KEY, DEFAULT_RAILS.to_string()))
            .await
    }

    async fn save(&self, user_id: u64, memory: &UserMemory) -> Result<(), StoreError> {
        let key = memory_key(user_id);
        let raw = serde_json::to_string(memory)
            .map_err(|source| StoreError::Corrupt { key: key.clone(), source })?;
        self.bounded(self.store.set(&key, raw)).await
    }

    async fn write_lock(&self, user_id: u64) -> WriteGuard<'_> {
        let lock = Arc::clone(self.write_locks.entry(user_id).or_default().value());
        WriteGuard {
            locks: &self.write_locks,
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

/// Holds one user's write lock. The map entry goes away with the last holder.
struct WriteGuard<'a> {
    locks: &'a DashMap<u64, Arc<Mutex<()>>>,
    user_id: u64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
