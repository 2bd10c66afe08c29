//! In-process cache backed by a mutex-guarded map.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CompareAndDelete, SharedCache};
use crate::{DepotError, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: &str, now: Instant, ttl: Duration) -> Result<Self> {
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| DepotError::Validation(format!("cache ttl out of range: {ttl:?}")))?;
        Ok(Self {
            value: value.to_string(),
            expires_at,
        })
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Cache held in process memory.
///
/// Every operation takes the same lock, so read-modify-write operations such
/// as [`SharedCache::compare_and_delete`] are atomic.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = Entry::new(value, Instant::now(), ttl)?;
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(value, now, ttl)?);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let removed = self.entries.lock().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at.saturating_duration_since(now)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<CompareAndDelete> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let outcome = match entries.get(key) {
            Some(e) if !e.is_live(now) => CompareAndDelete::Missing,
            Some(e) if e.value == expected => CompareAndDelete::Deleted,
            Some(_) => CompareAndDelete::Mismatch,
            None => CompareAndDelete::Missing,
        };
        if outcome != CompareAndDelete::Mismatch {
            entries.remove(key);
        }
        Ok(outcome)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }
}
