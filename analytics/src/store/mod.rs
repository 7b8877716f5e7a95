//! Key-value / set / list store contract consumed by the analytics core.
//!
//! The trait mirrors the small command surface of a Redis-like store: scalar
//! keys with optional expiry, unordered string sets, append-only lists and an
//! approximate-membership filter. All keys share a single namespace, so
//! [`KeyValueStore::delete`] and [`KeyValueStore::exists`] apply regardless of
//! the value's shape.
//!
//! Every method is declared as returning `impl Future + Send`; expiry workers
//! drive these futures from spawned tasks. Implementors may still write
//! `async fn`.

mod bloom;
mod memory;

pub use bloom::BloomFilter;
pub use memory::MemoryStore;

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection loss or any other backend failure. Surfaced to the caller,
    /// never retried by the core.
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage primitives used by ingestion, scheduling and graph queries.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str)
        -> impl Future<Output = Result<Option<String>, StoreError>> + Send;
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Remove a key of any shape. Deleting an absent key is a no-op.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;
    /// Expire a scalar key after `ttl`. No-op when the key is absent.
    fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Remaining time-to-live, or `None` when the key is absent or persistent.
    fn ttl(&self, key: &str) -> impl Future<Output = Result<Option<Duration>, StoreError>> + Send;
    /// Atomically increment an integer value, creating it at 0 first.
    fn increment(&self, key: &str) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn set_add(&self, key: &str, member: &str)
        -> impl Future<Output = Result<(), StoreError>> + Send;
    fn set_remove(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn set_members(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<HashSet<String>, StoreError>> + Send;
    /// Membership test for one member without reading the whole set.
    fn set_contains(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Inclusive range; negative indices count from the end (`-1` is last).
    fn list_range(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;
    fn list_push(&self, key: &str, value: &str)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    fn filter_add(
        &self,
        filter: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// May report false positives, never false negatives.
    fn filter_contains(
        &self,
        filter: &str,
        value: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Drop every key and filter.
    fn flush(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Resolve Redis-style inclusive `start..=end` indices against a list length.
/// Returns `None` when the range is empty.
pub fn resolve_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if start > end || start >= len || end < 0 {
        return None;
    }
    Some((start as usize, end as usize))
}
