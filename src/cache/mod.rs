//! Shared key-value cache with per-key expiry.
//!
//! Download tokens and their rate-limit markers live here. The trait keeps
//! the operations small enough to map onto a networked store; the in-process
//! [`MemoryCache`] is what the server uses on a single node.

mod memory;

pub use memory::MemoryCache;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Outcome of [`SharedCache::compare_and_delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareAndDelete {
    /// The key held the expected value and is now gone.
    Deleted,
    /// The key was absent or expired.
    Missing,
    /// The key held a different value and was left alone.
    Mismatch,
}

/// Key-value store with TTLs.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Set `key` only if it is absent. Returns `true` if the value was set.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Get the live value of `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Whether `key` holds a live value.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Delete `key`. Returns `true` if a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remaining lifetime of `key`, or `None` if absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Atomically delete `key` if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<CompareAndDelete>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
