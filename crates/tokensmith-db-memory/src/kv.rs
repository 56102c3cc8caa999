//! In-memory key/value cache with expiry.
//!
//! Backed by a lock-free papaya map. Expiry is checked at read time; an
//! expired entry is removed lazily by the reader that finds it, so there is
//! no background sweeper.

use std::time::Duration;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use time::OffsetDateTime;

use tokensmith_storage::error::StorageResult;
use tokensmith_storage::kv::KeyValueCache;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<OffsetDateTime>,
}

impl CacheEntry {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }
}

/// In-memory implementation of the key/value cache contract.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: PapayaHashMap<String, CacheEntry>,
}

impl MemoryCache {
    /// Creates a new, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: PapayaHashMap::new(),
        }
    }

    /// Returns the number of live (unexpired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        self.entries
            .pin()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    /// Returns `true` if the cache holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.pin();
        match entries.get(key) {
            Some(entry) if entry.is_expired(OffsetDateTime::now_utc()) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: ttl.map(|d| OffsetDateTime::now_utc() + d),
        };
        self.entries.pin().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.pin().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.unwrap().is_none());

        cache.set("k", "v1", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v1"));

        // Last write wins.
        cache.set("k", "v2", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v2"));

        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unexpiring_entry_survives() {
        let cache = MemoryCache::new();
        cache.set("k", "v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.len(), 1);
    }
}
