//! Record store gateway traits.
//!
//! A thin transactional CRUD surface per entity, plus a scoped transaction
//! primitive. Foreign-key style ownership (credentials, session tokens, and
//! reset tokens belong to a subject, with cascading delete) is established by
//! the backend once at startup; the traits only expose its effects.
//!
//! Implementations are provided by storage backends; `tokensmith-db-memory`
//! ships the embedded one.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::{Credential, ResetToken, SessionToken, Subject};

// =============================================================================
// Per-Entity Stores
// =============================================================================

/// Storage operations for subjects.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    /// Creates a new subject and returns the row as the store accepted it.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id or a contact identifier is already taken,
    /// or an error if the storage operation fails.
    async fn create(&self, subject: &Subject) -> StorageResult<Subject>;

    /// Finds a subject by its stable id.
    ///
    /// Returns `None` if the subject does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Subject>>;

    /// Finds a subject by its email contact identifier.
    ///
    /// Returns `None` if no subject carries that email.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<Subject>>;

    /// Updates an existing subject and returns the accepted row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the subject does not exist, or an error if the
    /// storage operation fails.
    async fn update(&self, subject: &Subject) -> StorageResult<Subject>;

    /// Deletes a subject, cascading to all owned credentials, session tokens,
    /// and reset tokens. Returns the number of subject rows deleted (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: &str) -> StorageResult<u64>;
}

/// Storage operations for credentials.
///
/// Credentials are append-only: rotation creates a new row and verification
/// reads the most recent row of the matching kind. They are deliberately not
/// cached, so rotation is visible on the very next verification.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Appends a new credential row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the owning subject does not exist, or an error
    /// if the storage operation fails.
    async fn create(&self, credential: &Credential) -> StorageResult<Credential>;

    /// Finds the most recently created credential of the given kind for a
    /// subject. Returns `None` if the subject has no credential of that kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_latest(&self, subject_id: &str, kind: &str)
    -> StorageResult<Option<Credential>>;
}

/// Storage operations for session tokens.
#[async_trait]
pub trait SessionTokenStore: Send + Sync {
    /// Persists a newly issued session token.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` on a duplicate token value, `NotFound` if the
    /// owning subject does not exist, or an error if the storage operation
    /// fails.
    async fn create(&self, token: &SessionToken) -> StorageResult<SessionToken>;

    /// Finds a session token by its token value.
    ///
    /// Returns tokens regardless of validity; callers check `is_valid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_token(&self, token: &str) -> StorageResult<Option<SessionToken>>;

    /// Sets the invalidation timestamp on one token, if it is not already
    /// set, and returns the updated row. Returns `None` if no matching token
    /// exists. Revocation is monotonic: the timestamp is never cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn invalidate(&self, token: &str) -> StorageResult<Option<SessionToken>>;

    /// Invalidates every currently-active token owned by a subject and
    /// returns the updated rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn invalidate_all_for_subject(
        &self,
        subject_id: &str,
    ) -> StorageResult<Vec<SessionToken>>;
}

/// Storage operations for password reset tokens.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Finds a reset token by its token value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_token(&self, token: &str) -> StorageResult<Option<ResetToken>>;

    /// Invalidates every currently-active reset token owned by a subject and
    /// returns the number of tokens invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn invalidate_all_for_subject(&self, subject_id: &str) -> StorageResult<u64>;
}

// =============================================================================
// Record Store
// =============================================================================

/// The durable record store gateway.
///
/// Hands out per-entity store handles and opens scoped transactions. All
/// multi-entity writes belonging to one logical operation (reset-token
/// creation, reset redemption) must go through a single [`StoreTransaction`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Subject operations.
    fn subjects(&self) -> &dyn SubjectStore;

    /// Credential operations.
    fn credentials(&self) -> &dyn CredentialStore;

    /// Session token operations.
    fn session_tokens(&self) -> &dyn SessionTokenStore;

    /// Reset token operations.
    fn reset_tokens(&self) -> &dyn ResetTokenStore;

    /// Opens a new transaction scope.
    ///
    /// Everything issued through the returned handle commits together or
    /// rolls back together. Nested work reuses the active transaction by
    /// passing the handle along; a transaction dropped without an explicit
    /// `commit` is rolled back.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction cannot be started.
    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>>;

    /// Verifies the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store cannot be reached.
    async fn ping(&self) -> StorageResult<()>;
}

// =============================================================================
// Transaction
// =============================================================================

/// A scoped transaction over the record store.
///
/// Operations issued through this handle are strictly ordered and atomic
/// with respect to each other. The handle exposes exactly the reads and
/// writes the engine needs inside its transactional flows.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads a subject inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn find_subject(&mut self, id: &str) -> StorageResult<Option<Subject>>;

    /// Reads a reset token inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn find_reset_token(&mut self, token: &str) -> StorageResult<Option<ResetToken>>;

    /// Creates a reset token inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` on a duplicate token value or `NotFound` if the
    /// owning subject does not exist.
    async fn create_reset_token(&mut self, token: &ResetToken) -> StorageResult<ResetToken>;

    /// Invalidates all of a subject's active reset tokens inside the
    /// transaction; returns the number invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn invalidate_reset_tokens(&mut self, subject_id: &str) -> StorageResult<u64>;

    /// Marks a reset token redeemed and returns the updated row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the token does not exist, or `Conflict` if it
    /// was already redeemed.
    async fn redeem_reset_token(&mut self, token: &str) -> StorageResult<ResetToken>;

    /// Appends a credential row inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the owning subject does not exist.
    async fn create_credential(&mut self, credential: &Credential) -> StorageResult<Credential>;

    /// Invalidates all of a subject's active session tokens inside the
    /// transaction and returns the updated rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn invalidate_session_tokens(
        &mut self,
        subject_id: &str,
    ) -> StorageResult<Vec<SessionToken>>;

    /// Commits the transaction, making all its writes visible at once.
    ///
    /// # Errors
    ///
    /// Returns `Transaction` if the commit fails; no writes are applied.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Rolls the transaction back, discarding all its writes.
    ///
    /// # Errors
    ///
    /// Returns `Transaction` if the rollback fails.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}
