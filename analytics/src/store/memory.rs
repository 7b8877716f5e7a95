use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{resolve_range, BloomFilter, KeyValueStore, StoreError};

#[derive(Debug, Clone)]
struct ScalarEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ScalarEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    scalars: HashMap<String, ScalarEntry>,
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, Vec<String>>,
    filters: HashMap<String, BloomFilter>,
}

impl Inner {
    fn live_scalar(&self, key: &str) -> Option<&ScalarEntry> {
        let now = Instant::now();
        self.scalars.get(key).filter(|e| e.is_live(now))
    }

    fn purge_if_expired(&mut self, key: &str) {
        let now = Instant::now();
        if self.scalars.get(key).is_some_and(|e| !e.is_live(now)) {
            self.scalars.remove(key);
        }
    }
}

/// In-process store. Expiry is measured on the tokio clock so tests running
/// with a paused clock observe TTLs deterministically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate backend unavailability: every operation fails while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store is offline".into()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner.live_scalar(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner.scalars.insert(
            key.to_string(),
            ScalarEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner.scalars.remove(key);
        inner.sets.remove(key);
        inner.lists.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner.live_scalar(key).is_some()
            || inner.sets.get(key).is_some_and(|s| !s.is_empty())
            || inner.lists.get(key).is_some_and(|l| !l.is_empty()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner.purge_if_expired(key);
        if let Some(entry) = inner.scalars.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let now = Instant::now();
        Ok(inner
            .live_scalar(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner.purge_if_expired(key);
        let entry = inner
            .scalars
            .entry(key.to_string())
            .or_insert_with(|| ScalarEntry {
                value: "0".to_string(),
                expires_at: None,
            });
        let current: i64 = entry
            .value
            .trim()
            .parse()
            .map_err(|_| StoreError::NotAnInteger {
                key: key.to_string(),
            })?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if let Some(set) = inner.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                inner.sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner.sets.get(key).cloned().unwrap_or_default())
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner.sets.get(key).is_some_and(|s| s.contains(member)))
    }

    async fn list_range(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let Some(list) = inner.lists.get(key) else {
            return Ok(vec![]);
        };
        Ok(match resolve_range(list.len(), start, end) {
            Some((from, to)) => list[from..=to].to_vec(),
            None => vec![],
        })
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn filter_add(&self, filter: &str, value: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner
            .filters
            .entry(filter.to_string())
            .or_default()
            .insert(value);
        Ok(())
    }

    async fn filter_contains(&self, filter: &str, value: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .filters
            .get(filter)
            .is_some_and(|f| f.contains(value)))
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        *inner = Inner::default();
        Ok(())
    }
}
