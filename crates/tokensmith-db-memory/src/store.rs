//! In-memory transactional record store.
//!
//! Entity rows live in plain maps behind one tokio `RwLock`. Non-transactional
//! operations take the lock briefly; a transaction holds the write half for
//! its whole scope, which serializes it against every other writer, and keeps
//! a snapshot of the pre-transaction state for rollback. A transaction handle
//! dropped without commit restores the snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use tokensmith_storage::error::{StorageError, StorageResult};
use tokensmith_storage::traits::{
    CredentialStore, RecordStore, ResetTokenStore, SessionTokenStore, StoreTransaction,
    SubjectStore,
};
use tokensmith_storage::types::{Credential, ResetToken, SessionToken, Subject};

// =============================================================================
// State
// =============================================================================

/// All entity rows. Credentials keep insertion order so "most recently
/// created of a kind" is simply the last matching row.
#[derive(Debug, Clone, Default)]
struct StoreState {
    subjects: HashMap<String, Subject>,
    credentials: Vec<Credential>,
    session_tokens: HashMap<String, SessionToken>,
    reset_tokens: HashMap<String, ResetToken>,
}

type SharedState = Arc<RwLock<StoreState>>;

// =============================================================================
// Shared Mutations
// =============================================================================
//
// The same row-level logic backs both the plain store handles and the
// transaction handle, so transactional and non-transactional paths cannot
// drift apart.

fn insert_subject(state: &mut StoreState, subject: &Subject) -> StorageResult<Subject> {
    if state.subjects.contains_key(&subject.id) {
        return Err(StorageError::conflict(format!(
            "subject {} already exists",
            subject.id
        )));
    }
    let contact_taken = state.subjects.values().any(|existing| {
        (subject.email.is_some() && existing.email == subject.email)
            || (subject.phone.is_some() && existing.phone == subject.phone)
    });
    if contact_taken {
        return Err(StorageError::conflict(
            "contact identifier already registered",
        ));
    }
    state
        .subjects
        .insert(subject.id.clone(), subject.clone());
    Ok(subject.clone())
}

fn require_subject(state: &StoreState, subject_id: &str) -> StorageResult<()> {
    if state.subjects.contains_key(subject_id) {
        Ok(())
    } else {
        Err(StorageError::not_found(format!("subject {subject_id}")))
    }
}

fn insert_credential(state: &mut StoreState, credential: &Credential) -> StorageResult<Credential> {
    require_subject(state, &credential.subject_id)?;
    state.credentials.push(credential.clone());
    Ok(credential.clone())
}

fn insert_session_token(state: &mut StoreState, token: &SessionToken) -> StorageResult<SessionToken> {
    require_subject(state, &token.subject_id)?;
    if state.session_tokens.contains_key(&token.token) {
        return Err(StorageError::conflict("session token value already exists"));
    }
    state
        .session_tokens
        .insert(token.token.clone(), token.clone());
    Ok(token.clone())
}

fn insert_reset_token(state: &mut StoreState, token: &ResetToken) -> StorageResult<ResetToken> {
    require_subject(state, &token.subject_id)?;
    if state.reset_tokens.contains_key(&token.token) {
        return Err(StorageError::conflict("reset token value already exists"));
    }
    state
        .reset_tokens
        .insert(token.token.clone(), token.clone());
    Ok(token.clone())
}

fn invalidate_one_session(state: &mut StoreState, token: &str) -> Option<SessionToken> {
    let row = state.session_tokens.get_mut(token)?;
    // Monotonic: an existing invalidation timestamp is never overwritten.
    if row.invalidated_at.is_none() {
        row.invalidated_at = Some(OffsetDateTime::now_utc());
    }
    Some(row.clone())
}

fn invalidate_active_sessions(state: &mut StoreState, subject_id: &str) -> Vec<SessionToken> {
    let now = OffsetDateTime::now_utc();
    let mut updated = Vec::new();
    for row in state.session_tokens.values_mut() {
        if row.subject_id == subject_id && row.is_valid(now) {
            row.invalidated_at = Some(now);
            updated.push(row.clone());
        }
    }
    updated
}

fn invalidate_active_resets(state: &mut StoreState, subject_id: &str) -> u64 {
    let now = OffsetDateTime::now_utc();
    let mut count = 0;
    for row in state.reset_tokens.values_mut() {
        if row.subject_id == subject_id && row.is_active(now) {
            row.invalidated_at = Some(now);
            count += 1;
        }
    }
    count
}

fn redeem_reset(state: &mut StoreState, token: &str) -> StorageResult<ResetToken> {
    let row = state
        .reset_tokens
        .get_mut(token)
        .ok_or_else(|| StorageError::not_found("reset token"))?;
    if row.redeemed_at.is_some() {
        return Err(StorageError::conflict("reset token already redeemed"));
    }
    row.redeemed_at = Some(OffsetDateTime::now_utc());
    Ok(row.clone())
}

fn delete_subject_cascade(state: &mut StoreState, id: &str) -> u64 {
    if state.subjects.remove(id).is_none() {
        return 0;
    }
    state.credentials.retain(|c| c.subject_id != id);
    state.session_tokens.retain(|_, t| t.subject_id != id);
    state.reset_tokens.retain(|_, t| t.subject_id != id);
    1
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-memory implementation of the record store gateway.
pub struct MemoryStore {
    subjects: MemorySubjects,
    credentials: MemoryCredentials,
    session_tokens: MemorySessionTokens,
    reset_tokens: MemoryResetTokens,
    state: SharedState,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        let state: SharedState = Arc::new(RwLock::new(StoreState::default()));
        Self {
            subjects: MemorySubjects {
                state: state.clone(),
            },
            credentials: MemoryCredentials {
                state: state.clone(),
            },
            session_tokens: MemorySessionTokens {
                state: state.clone(),
            },
            reset_tokens: MemoryResetTokens {
                state: state.clone(),
            },
            state,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn subjects(&self) -> &dyn SubjectStore {
        &self.subjects
    }

    fn credentials(&self) -> &dyn CredentialStore {
        &self.credentials
    }

    fn session_tokens(&self) -> &dyn SessionTokenStore {
        &self.session_tokens
    }

    fn reset_tokens(&self) -> &dyn ResetTokenStore {
        &self.reset_tokens
    }

    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().write_owned().await;
        let snapshot = Some(guard.clone());
        Ok(Box::new(MemoryTransaction { guard, snapshot }))
    }

    async fn ping(&self) -> StorageResult<()> {
        // The embedded store is reachable as long as it exists.
        Ok(())
    }
}

// =============================================================================
// Per-Entity Handles
// =============================================================================

struct MemorySubjects {
    state: SharedState,
}

#[async_trait]
impl SubjectStore for MemorySubjects {
    async fn create(&self, subject: &Subject) -> StorageResult<Subject> {
        let mut state = self.state.write().await;
        insert_subject(&mut state, subject)
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Subject>> {
        Ok(self.state.read().await.subjects.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<Subject>> {
        Ok(self
            .state
            .read()
            .await
            .subjects
            .values()
            .find(|s| s.email.as_deref() == Some(email))
            .cloned())
    }

    async fn update(&self, subject: &Subject) -> StorageResult<Subject> {
        let mut state = self.state.write().await;
        let row = state
            .subjects
            .get_mut(&subject.id)
            .ok_or_else(|| StorageError::not_found(format!("subject {}", subject.id)))?;
        let mut accepted = subject.clone();
        accepted.created_at = row.created_at;
        accepted.updated_at = OffsetDateTime::now_utc();
        *row = accepted.clone();
        Ok(accepted)
    }

    async fn delete(&self, id: &str) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        Ok(delete_subject_cascade(&mut state, id))
    }
}

struct MemoryCredentials {
    state: SharedState,
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn create(&self, credential: &Credential) -> StorageResult<Credential> {
        let mut state = self.state.write().await;
        insert_credential(&mut state, credential)
    }

    async fn find_latest(
        &self,
        subject_id: &str,
        kind: &str,
    ) -> StorageResult<Option<Credential>> {
        Ok(self
            .state
            .read()
            .await
            .credentials
            .iter()
            .rev()
            .find(|c| c.subject_id == subject_id && c.kind == kind)
            .cloned())
    }
}

struct MemorySessionTokens {
    state: SharedState,
}

#[async_trait]
impl SessionTokenStore for MemorySessionTokens {
    async fn create(&self, token: &SessionToken) -> StorageResult<SessionToken> {
        let mut state = self.state.write().await;
        insert_session_token(&mut state, token)
    }

    async fn find_by_token(&self, token: &str) -> StorageResult<Option<SessionToken>> {
        Ok(self.state.read().await.session_tokens.get(token).cloned())
    }

    async fn invalidate(&self, token: &str) -> StorageResult<Option<SessionToken>> {
        let mut state = self.state.write().await;
        Ok(invalidate_one_session(&mut state, token))
    }

    async fn invalidate_all_for_subject(
        &self,
        subject_id: &str,
    ) -> StorageResult<Vec<SessionToken>> {
        let mut state = self.state.write().await;
        Ok(invalidate_active_sessions(&mut state, subject_id))
    }
}

struct MemoryResetTokens {
    state: SharedState,
}

#[async_trait]
impl ResetTokenStore for MemoryResetTokens {
    async fn find_by_token(&self, token: &str) -> StorageResult<Option<ResetToken>> {
        Ok(self.state.read().await.reset_tokens.get(token).cloned())
    }

    async fn invalidate_all_for_subject(&self, subject_id: &str) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        Ok(invalidate_active_resets(&mut state, subject_id))
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A transaction over the in-memory store.
///
/// Holds the store's write lock for its whole scope. `snapshot` is `Some`
/// until commit; `Drop` restores it, so abandoning the handle rolls back.
struct MemoryTransaction {
    guard: OwnedRwLockWriteGuard<StoreState>,
    snapshot: Option<StoreState>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_subject(&mut self, id: &str) -> StorageResult<Option<Subject>> {
        Ok(self.guard.subjects.get(id).cloned())
    }

    async fn find_reset_token(&mut self, token: &str) -> StorageResult<Option<ResetToken>> {
        Ok(self.guard.reset_tokens.get(token).cloned())
    }

    async fn create_reset_token(&mut self, token: &ResetToken) -> StorageResult<ResetToken> {
        insert_reset_token(&mut self.guard, token)
    }

    async fn invalidate_reset_tokens(&mut self, subject_id: &str) -> StorageResult<u64> {
        Ok(invalidate_active_resets(&mut self.guard, subject_id))
    }

    async fn redeem_reset_token(&mut self, token: &str) -> StorageResult<ResetToken> {
        redeem_reset(&mut self.guard, token)
    }

    async fn create_credential(&mut self, credential: &Credential) -> StorageResult<Credential> {
        insert_credential(&mut self.guard, credential)
    }

    async fn invalidate_session_tokens(
        &mut self,
        subject_id: &str,
    ) -> StorageResult<Vec<SessionToken>> {
        Ok(invalidate_active_sessions(&mut self.guard, subject_id))
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        // Discarding the snapshot keeps the in-place writes when the lock
        // is released on drop.
        self.snapshot.take();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        // Not committed: restore the pre-transaction state.
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn subject(id: &str) -> Subject {
        Subject::new(id).with_email(format!("{id}@example.com"))
    }

    #[tokio::test]
    async fn test_create_and_find_subject() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();

        let found = store.subjects().find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(found.id, "u1");

        let by_email = store
            .subjects()
            .find_by_email("u1@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, "u1");

        assert!(store.subjects().find_by_id("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_subject_conflicts() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();

        let err = store.subjects().create(&subject("u1")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let mut other = Subject::new("u2").with_email("u1@example.com");
        let err = store.subjects().create(&other).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        other.email = Some("u2@example.com".to_string());
        store.subjects().create(&other).await.unwrap();
    }

    #[tokio::test]
    async fn test_credential_requires_subject() {
        let store = MemoryStore::new();
        let cred = Credential::new("ghost", "primary", "$argon2id$digest");
        let err = store.credentials().create(&cred).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_latest_credential_wins_after_rotation() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();

        let first = Credential::new("u1", "primary", "digest-1");
        let second = Credential::new("u1", "primary", "digest-2");
        store.credentials().create(&first).await.unwrap();
        store.credentials().create(&second).await.unwrap();

        let latest = store
            .credentials()
            .find_latest("u1", "primary")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.digest, "digest-2");

        // A different kind is tracked independently.
        assert!(
            store
                .credentials()
                .find_latest("u1", "recovery")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_session_invalidation_is_monotonic() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();
        let token = SessionToken::new("t1", "u1", "app", None);
        store.session_tokens().create(&token).await.unwrap();

        let revoked = store
            .session_tokens()
            .invalidate("t1")
            .await
            .unwrap()
            .unwrap();
        let stamp = revoked.invalidated_at.unwrap();

        // Repeat invalidation keeps the original timestamp.
        let again = store
            .session_tokens()
            .invalidate("t1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.invalidated_at.unwrap(), stamp);

        assert!(
            store
                .session_tokens()
                .invalidate("missing")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_invalidate_all_skips_inactive_sessions() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();

        let active = SessionToken::new("t1", "u1", "app", None);
        let mut revoked = SessionToken::new("t2", "u1", "app", None);
        revoked.invalidated_at = Some(OffsetDateTime::now_utc());
        let expired = SessionToken::new(
            "t3",
            "u1",
            "app",
            Some(OffsetDateTime::now_utc() - Duration::hours(1)),
        );
        for t in [&active, &revoked, &expired] {
            store.session_tokens().create(t).await.unwrap();
        }

        let updated = store
            .session_tokens()
            .invalidate_all_for_subject("u1")
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].token, "t1");
    }

    #[tokio::test]
    async fn test_delete_subject_cascades() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();
        store
            .credentials()
            .create(&Credential::new("u1", "primary", "digest"))
            .await
            .unwrap();
        store
            .session_tokens()
            .create(&SessionToken::new("t1", "u1", "app", None))
            .await
            .unwrap();

        assert_eq!(store.subjects().delete("u1").await.unwrap(), 1);
        assert!(store.subjects().find_by_id("u1").await.unwrap().is_none());
        assert!(
            store
                .session_tokens()
                .find_by_token("t1")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .credentials()
                .find_latest("u1", "primary")
                .await
                .unwrap()
                .is_none()
        );

        // Second delete affects zero rows.
        assert_eq!(store.subjects().delete("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_all_resets_counts_active_only() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();
        let reset = ResetToken::new("u1", OffsetDateTime::now_utc() + Duration::hours(1));

        let mut tx = store.begin().await.unwrap();
        tx.create_reset_token(&reset).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            store
                .reset_tokens()
                .invalidate_all_for_subject("u1")
                .await
                .unwrap(),
            1
        );
        let row = store
            .reset_tokens()
            .find_by_token(&reset.token)
            .await
            .unwrap()
            .unwrap();
        assert!(row.invalidated_at.is_some());

        // The token is no longer active, so a second sweep touches nothing.
        assert_eq!(
            store
                .reset_tokens()
                .invalidate_all_for_subject("u1")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_transaction_commit_applies_all_writes() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();
        let reset = ResetToken::new("u1", OffsetDateTime::now_utc() + Duration::hours(1));

        let mut tx = store.begin().await.unwrap();
        tx.create_reset_token(&reset).await.unwrap();
        tx.create_credential(&Credential::new("u1", "primary", "digest"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(
            store
                .reset_tokens()
                .find_by_token(&reset.token)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .credentials()
                .find_latest("u1", "primary")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_all_writes() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();
        let reset = ResetToken::new("u1", OffsetDateTime::now_utc() + Duration::hours(1));

        let mut tx = store.begin().await.unwrap();
        tx.create_reset_token(&reset).await.unwrap();
        tx.create_credential(&Credential::new("u1", "primary", "digest"))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(
            store
                .reset_tokens()
                .find_by_token(&reset.token)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .credentials()
                .find_latest("u1", "primary")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();
        let reset = ResetToken::new("u1", OffsetDateTime::now_utc() + Duration::hours(1));

        {
            let mut tx = store.begin().await.unwrap();
            tx.create_reset_token(&reset).await.unwrap();
            // Dropped without commit.
        }

        assert!(
            store
                .reset_tokens()
                .find_by_token(&reset.token)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_redeem_reset_token_is_single_use() {
        let store = MemoryStore::new();
        store.subjects().create(&subject("u1")).await.unwrap();
        let reset = ResetToken::new("u1", OffsetDateTime::now_utc() + Duration::hours(1));

        let mut tx = store.begin().await.unwrap();
        tx.create_reset_token(&reset).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let redeemed = tx.redeem_reset_token(&reset.token).await.unwrap();
        assert!(redeemed.redeemed_at.is_some());

        let err = tx.redeem_reset_token(&reset.token).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        tx.commit().await.unwrap();
    }
}
