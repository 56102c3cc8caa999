//! Cache-aside wrappers over the record store.
//!
//! Reads go through the cache: a miss falls back to the store and the hit
//! is written back. Mutations never patch cached entries in place; they
//! re-read the row from the store and overwrite the cached copy, so the
//! cache only ever holds what the store returned. Negative results are
//! never cached.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;
use tokensmith_storage::{KeyValueCache, RecordStore, SessionToken, Subject};

use crate::error::AuthResult;

// =============================================================================
// Keyed JSON transcoding
// =============================================================================

/// Namespaced JSON view over a [`KeyValueCache`].
///
/// Keys have the shape `{namespace}:{collection}:{id}`.
#[derive(Clone)]
pub struct EntityCache {
    cache: Arc<dyn KeyValueCache>,
    namespace: String,
    ttl: Option<std::time::Duration>,
}

impl EntityCache {
    #[must_use]
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        namespace: impl Into<String>,
        ttl: Option<std::time::Duration>,
    ) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            ttl,
        }
    }

    /// Read and decode a cached entry.
    ///
    /// An entry that fails to decode is treated as a miss and evicted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails.
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> AuthResult<Option<T>> {
        let key = self.key(collection, id);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "evicting undecodable cache entry");
                self.cache.delete(&key).await?;
                Ok(None)
            }
        }
    }

    /// Encode and store an entry, using the given TTL or the default one.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the cache backend fails.
    pub async fn put<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        value: &T,
        ttl: Option<std::time::Duration>,
    ) -> AuthResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(tokensmith_storage::StorageError::from)?;
        self.cache
            .set(&self.key(collection, id), &raw, ttl.or(self.ttl))
            .await?;
        Ok(())
    }

    /// Drop a cached entry if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails.
    pub async fn evict(&self, collection: &str, id: &str) -> AuthResult<()> {
        self.cache.delete(&self.key(collection, id)).await?;
        Ok(())
    }

    fn key(&self, collection: &str, id: &str) -> String {
        format!("{}:{collection}:{id}", self.namespace)
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Subjects
// =============================================================================

const SUBJECTS: &str = "subjects";
const SESSIONS: &str = "sessions";

/// Cache-aside access to subjects, keyed by subject id.
#[derive(Clone)]
pub struct SubjectCache {
    entities: EntityCache,
    store: Arc<dyn RecordStore>,
}

impl SubjectCache {
    #[must_use]
    pub fn new(entities: EntityCache, store: Arc<dyn RecordStore>) -> Self {
        Self { entities, store }
    }

    /// Fetch a subject by id, reading through to the store on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or cache backend fails.
    pub async fn fetch_by_id(&self, id: &str) -> AuthResult<Option<Subject>> {
        if let Some(subject) = self.entities.get(SUBJECTS, id).await? {
            return Ok(Some(subject));
        }
        let Some(subject) = self.store.subjects().find_by_id(id).await? else {
            return Ok(None);
        };
        self.entities.put(SUBJECTS, id, &subject, None).await?;
        Ok(Some(subject))
    }

    /// Fetch a subject by email.
    ///
    /// Email is not a cache key; the store is consulted directly and the
    /// result is written back under the subject's id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or cache backend fails.
    pub async fn fetch_by_email(&self, email: &str) -> AuthResult<Option<Subject>> {
        let Some(subject) = self.store.subjects().find_by_email(email).await? else {
            return Ok(None);
        };
        self.entities
            .put(SUBJECTS, &subject.id, &subject, None)
            .await?;
        Ok(Some(subject))
    }

    /// Re-read a subject from the store and overwrite its cached copy.
    ///
    /// If the row is gone the cached copy is evicted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or cache backend fails.
    pub async fn refresh(&self, id: &str) -> AuthResult<Option<Subject>> {
        match self.store.subjects().find_by_id(id).await? {
            Some(subject) => {
                self.entities.put(SUBJECTS, id, &subject, None).await?;
                Ok(Some(subject))
            }
            None => {
                self.entities.evict(SUBJECTS, id).await?;
                Ok(None)
            }
        }
    }

    /// Drop a subject's cached copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails.
    pub async fn evict(&self, id: &str) -> AuthResult<()> {
        self.entities.evict(SUBJECTS, id).await
    }
}

// =============================================================================
// Session tokens
// =============================================================================

/// Cache-aside access to session tokens, keyed by the signed token string.
#[derive(Clone)]
pub struct SessionTokenCache {
    entities: EntityCache,
    store: Arc<dyn RecordStore>,
}

impl SessionTokenCache {
    #[must_use]
    pub fn new(entities: EntityCache, store: Arc<dyn RecordStore>) -> Self {
        Self { entities, store }
    }

    /// Fetch a session token record, reading through on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or cache backend fails.
    pub async fn fetch(&self, token: &str) -> AuthResult<Option<SessionToken>> {
        if let Some(record) = self.entities.get(SESSIONS, token).await? {
            return Ok(Some(record));
        }
        let Some(record) = self.store.session_tokens().find_by_token(token).await? else {
            return Ok(None);
        };
        self.put(&record).await?;
        Ok(Some(record))
    }

    /// Write a session token record into the cache.
    ///
    /// The entry's TTL is capped at the token's remaining lifetime; a
    /// record that is already expired is not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails.
    pub async fn put(&self, record: &SessionToken) -> AuthResult<()> {
        let ttl = match record.expires_at {
            Some(expires_at) => {
                let remaining = expires_at - OffsetDateTime::now_utc();
                match std::time::Duration::try_from(remaining) {
                    Ok(remaining) => Some(remaining),
                    // Negative remaining lifetime.
                    Err(_) => return Ok(()),
                }
            }
            None => None,
        };
        self.entities.put(SESSIONS, &record.token, record, ttl).await
    }

    /// Re-read a session token from the store and overwrite its cached
    /// copy, evicting it if the row is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or cache backend fails.
    pub async fn refresh(&self, token: &str) -> AuthResult<Option<SessionToken>> {
        match self.store.session_tokens().find_by_token(token).await? {
            Some(record) => {
                self.put(&record).await?;
                Ok(Some(record))
            }
            None => {
                self.entities.evict(SESSIONS, token).await?;
                Ok(None)
            }
        }
    }
}
