//! Generic key/value cache contract.
//!
//! The cache stores serialized structured records as strings under
//! namespaced keys, with an optional time-to-live. It carries no
//! transactional semantics and is never authoritative; the cache-aside
//! layer in `tokensmith-auth` builds its read-through/write-through policy
//! on top of this contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageResult;

/// A per-namespace string key/value store with optional expiry.
///
/// Implementations may be backed by Redis, an embedded map, or anything
/// that can hold strings for a bounded time. Values are the serialized
/// ("stringified") form of structured records; transcoding is the caller's
/// responsibility.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Gets the value stored under `key`.
    ///
    /// Returns `None` on a miss, including when a previously stored value
    /// has expired.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the cache cannot be reached.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, overwriting any existing value.
    ///
    /// When `ttl` is given, the value expires after that duration; otherwise
    /// it lives until overwritten or deleted. Writes are last-write-wins
    /// with no ordering guarantee across concurrent writers.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the cache cannot be reached.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()>;

    /// Removes the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the cache cannot be reached.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
