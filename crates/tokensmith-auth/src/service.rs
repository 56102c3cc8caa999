//! Credential and session orchestration.
//!
//! [`AuthService`] composes the hasher, the token codec, the cache-aside
//! layer, and the record store behind a one-shot connection gate. Entry
//! points take plain structured input and return plain structured results;
//! nothing transport-specific crosses this boundary.
//!
//! Every mutation of a cached entity follows the write-through protocol:
//! the row is re-read from the store after the write and the cached copy is
//! overwritten with what the store accepted, never with the mutation input.

use std::sync::Arc;

use time::OffsetDateTime;
use tokensmith_storage::{
    Credential, KeyValueCache, RecordStore, ResetToken, SessionToken, Subject,
};
use uuid::Uuid;

use crate::cache::{EntityCache, SessionTokenCache, SubjectCache};
use crate::codec::{SessionClaims, TokenCodec};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::gate::ConnectionGate;
use crate::hasher::CredentialHasher;

/// Credential kind written by sign-up and password reset.
pub const PASSWORD_KIND: &str = "password";

// =============================================================================
// Inputs and outputs
// =============================================================================

/// How to locate the subject during login.
#[derive(Debug, Clone)]
pub enum SubjectLocator {
    /// By stable subject id.
    Id(String),
    /// By email contact identifier.
    Email(String),
}

/// Input to [`AuthService::sign_up`].
#[derive(Debug, Clone, Default)]
pub struct SignUpRequest {
    /// Stable id for the new subject; generated when absent.
    pub id: Option<String>,
    /// Optional email contact identifier.
    pub email: Option<String>,
    /// Optional phone contact identifier.
    pub phone: Option<String>,
    /// Initial password.
    pub secret: String,
    /// When set, a sign-up that collides with an existing subject falls
    /// back to a login with the same credentials. If that login also
    /// fails, the original sign-up error is surfaced.
    pub fallback_login: bool,
}

/// Input to [`AuthService::redeem_password_reset`].
#[derive(Debug, Clone)]
pub struct RedeemResetRequest {
    /// The reset token value.
    pub token: String,
    /// The replacement password.
    pub new_secret: String,
    /// Optional email cross-check against the owning subject.
    pub email: Option<String>,
}

/// An authenticated session: the verified token record plus the owning
/// subject's public projection.
#[derive(Debug, Clone)]
pub struct Session {
    /// The session token record, as verified against the store.
    pub token: SessionToken,
    /// The owning subject.
    pub subject: Subject,
}

// =============================================================================
// Service
// =============================================================================

/// Connected storage handles, resolved once at startup.
#[derive(Clone)]
struct ServiceHandles {
    store: Arc<dyn RecordStore>,
    subjects: SubjectCache,
    sessions: SessionTokenCache,
}

/// The credential-issuance and session-validation engine.
///
/// Construct with [`AuthService::new`], then call
/// [`AuthService::connect`] once the store and cache are available. Entry
/// points invoked before `connect` suspend until it happens.
pub struct AuthService {
    config: AuthConfig,
    hasher: CredentialHasher,
    codec: TokenCodec,
    gate: ConnectionGate<ServiceHandles>,
}

impl AuthService {
    /// Create a disconnected service from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the configuration is
    /// invalid.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|err| AuthError::configuration(err.to_string()))?;
        let hasher = CredentialHasher::new(config.pepper.clone(), &config.hashing)?;
        let codec = TokenCodec::new(&config.token_secret, config.issuer.clone());
        Ok(Self {
            config,
            hasher,
            codec,
            gate: ConnectionGate::new(),
        })
    }

    /// Attach the storage backends and release every waiting caller.
    ///
    /// Calling this a second time is a programming error; the first
    /// connection stays in effect.
    pub fn connect(&self, store: Arc<dyn RecordStore>, cache: Arc<dyn KeyValueCache>) {
        let entities = EntityCache::new(
            cache,
            self.config.cache.namespace.clone(),
            self.config.cache.subject_ttl,
        );
        self.gate.resolve(ServiceHandles {
            subjects: SubjectCache::new(entities.clone(), Arc::clone(&store)),
            sessions: SessionTokenCache::new(entities, Arc::clone(&store)),
            store,
        });
        tracing::info!("storage connected; auth service ready");
    }

    /// Whether [`AuthService::connect`] has been called.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.gate.is_resolved()
    }

    // ===== Sign-up and login =====

    /// Create a subject with an initial password credential, then log it
    /// in and return the fresh session.
    ///
    /// With `fallback_login` set, a sign-up that conflicts with an
    /// existing subject is retried as a login; if the login also fails,
    /// the original sign-up error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for an empty secret,
    /// [`AuthError::Conflict`] when the id or a contact identifier is
    /// already taken, or an error from hashing or storage.
    pub async fn sign_up(&self, request: SignUpRequest) -> AuthResult<Session> {
        if request.secret.is_empty() {
            return Err(AuthError::validation("secret must not be empty"));
        }

        let id = request
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut subject = Subject::new(&id);
        subject.email = request.email.clone();
        subject.phone = request.phone.clone();

        let handles = self.gate.wait().await;
        match handles.store.subjects().create(&subject).await {
            Ok(created) => {
                handles.subjects.refresh(&created.id).await?;
                let digest = self.hasher.hash_async(&request.secret, &created.id).await?;
                handles
                    .store
                    .credentials()
                    .create(&Credential::new(&created.id, PASSWORD_KIND, digest))
                    .await?;
                tracing::info!(subject_id = %created.id, "subject signed up");
                self.login(SubjectLocator::Id(created.id), &request.secret)
                    .await
            }
            Err(err) => {
                let original = AuthError::from(err);
                if request.fallback_login && matches!(original, AuthError::Conflict { .. }) {
                    let locator = match (&request.id, &request.email) {
                        (Some(id), _) => SubjectLocator::Id(id.clone()),
                        (None, Some(email)) => SubjectLocator::Email(email.clone()),
                        (None, None) => return Err(original),
                    };
                    tracing::debug!("sign-up conflict; attempting fallback login");
                    match self.login(locator, &request.secret).await {
                        Ok(session) => return Ok(session),
                        // The fallback's failure detail is deliberately
                        // discarded in favor of the sign-up error.
                        Err(_) => return Err(original),
                    }
                }
                Err(original)
            }
        }
    }

    /// Authenticate a subject and issue a fresh session token.
    ///
    /// Unknown subject, missing credential, and password mismatch all
    /// collapse into one `Unauthorized("invalid credentials")`; the
    /// distinction survives only in the logs.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for an empty secret,
    /// [`AuthError::Unauthorized`] when authentication fails, or an error
    /// from hashing or storage.
    pub async fn login(&self, locator: SubjectLocator, secret: &str) -> AuthResult<Session> {
        if secret.is_empty() {
            return Err(AuthError::validation("secret must not be empty"));
        }

        let handles = self.gate.wait().await;
        let (subject, credential) = match &locator {
            // The locator already carries the credential owner's id, so
            // both lookups can run concurrently.
            SubjectLocator::Id(id) => tokio::try_join!(
                handles.subjects.fetch_by_id(id),
                async {
                    handles
                        .store
                        .credentials()
                        .find_latest(id, PASSWORD_KIND)
                        .await
                        .map_err(AuthError::from)
                }
            )?,
            SubjectLocator::Email(email) => {
                let subject = handles.subjects.fetch_by_email(email).await?;
                let credential = match &subject {
                    Some(subject) => {
                        handles
                            .store
                            .credentials()
                            .find_latest(&subject.id, PASSWORD_KIND)
                            .await?
                    }
                    None => None,
                };
                (subject, credential)
            }
        };

        let (Some(subject), Some(credential)) = (subject, credential) else {
            tracing::debug!(?locator, "login rejected: unknown subject or no credential");
            return Err(AuthError::unauthorized("invalid credentials"));
        };

        if !self
            .hasher
            .verify_async(secret, &subject.id, &credential.digest)
            .await?
        {
            tracing::debug!(subject_id = %subject.id, "login rejected: credential mismatch");
            return Err(AuthError::unauthorized("invalid credentials"));
        }

        self.issue(&handles, subject).await
    }

    /// Sign, persist, and re-verify a new session token for a subject.
    async fn issue(&self, handles: &ServiceHandles, subject: Subject) -> AuthResult<Session> {
        let now = OffsetDateTime::now_utc();
        let expires_at = self
            .config
            .tokens
            .session_lifetime
            .map(|lifetime| now + lifetime);

        let claims = SessionClaims::new(&subject.id, self.codec.issuer(), now, expires_at);
        let token = self.codec.sign(&claims)?;

        let record = SessionToken::new(&token, &subject.id, &self.config.provider, expires_at);
        handles.store.session_tokens().create(&record).await?;
        handles.sessions.refresh(&token).await?;
        tracing::debug!(subject_id = %subject.id, "session token issued");

        // Issuance goes through the verify path so callers always receive
        // the same projection verification would return.
        self.verify_token(&token).await
    }

    // ===== Verification and revocation =====

    /// Verify a presented bearer token.
    ///
    /// Both checks must pass: the stored record must be active and
    /// unexpired, and the token's signature and claims must validate.
    /// Either failing alone fails the verification.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotFound`] for an unknown token,
    /// [`AuthError::Unauthorized`] for a revoked token or bad signature,
    /// [`AuthError::Expired`] for an expired token, or an error from
    /// storage.
    pub async fn verify_token(&self, token: &str) -> AuthResult<Session> {
        let handles = self.gate.wait().await;

        let Some(record) = handles.sessions.fetch(token).await? else {
            return Err(AuthError::not_found("unknown session token"));
        };
        let now = OffsetDateTime::now_utc();
        if record.is_invalidated() {
            return Err(AuthError::unauthorized("session token revoked"));
        }
        if record.is_expired(now) {
            return Err(AuthError::expired("session token expired"));
        }

        let claims = self.codec.parse(token)?;
        if claims.sub != record.subject_id {
            tracing::warn!(
                claimed = %claims.sub,
                recorded = %record.subject_id,
                "session token subject mismatch"
            );
            return Err(AuthError::unauthorized("invalid session token"));
        }

        let Some(subject) = handles.subjects.fetch_by_id(&record.subject_id).await? else {
            tracing::debug!(subject_id = %record.subject_id, "session token owner missing");
            return Err(AuthError::unauthorized("invalid session token"));
        };

        Ok(Session {
            token: record,
            subject,
        })
    }

    /// Revoke one session token by value.
    ///
    /// Returns the revoked record, or `None` if no matching token exists.
    /// Revocation is monotonic; revoking an already revoked token keeps
    /// its original invalidation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or cache backend fails.
    pub async fn invalidate_token(&self, token: &str) -> AuthResult<Option<SessionToken>> {
        let handles = self.gate.wait().await;
        if handles.store.session_tokens().invalidate(token).await?.is_none() {
            return Ok(None);
        }
        let refreshed = handles.sessions.refresh(token).await?;
        tracing::info!("session token revoked");
        Ok(refreshed)
    }

    /// Revoke every active session token owned by a subject and return
    /// the revoked records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or cache backend fails.
    pub async fn invalidate_all_for_subject(
        &self,
        subject_id: &str,
    ) -> AuthResult<Vec<SessionToken>> {
        let handles = self.gate.wait().await;
        let updated = handles
            .store
            .session_tokens()
            .invalidate_all_for_subject(subject_id)
            .await?;

        let mut refreshed = Vec::with_capacity(updated.len());
        for row in &updated {
            if let Some(row) = handles.sessions.refresh(&row.token).await? {
                refreshed.push(row);
            }
        }
        tracing::info!(subject_id = %subject_id, revoked = refreshed.len(), "sessions revoked");
        Ok(refreshed)
    }

    // ===== Credentials =====

    /// Append a new credential of the given kind for a subject.
    ///
    /// Verification always reads the most recent credential of a kind, so
    /// this rotates the effective password when `kind` is
    /// [`PASSWORD_KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for an empty secret,
    /// [`AuthError::NotFound`] for an unknown subject, or an error from
    /// hashing or storage.
    pub async fn add_credential(
        &self,
        subject_id: &str,
        kind: &str,
        secret: &str,
    ) -> AuthResult<Credential> {
        if secret.is_empty() {
            return Err(AuthError::validation("secret must not be empty"));
        }
        let handles = self.gate.wait().await;
        if handles.subjects.fetch_by_id(subject_id).await?.is_none() {
            return Err(AuthError::not_found("unknown subject"));
        }
        let digest = self.hasher.hash_async(secret, subject_id).await?;
        let created = handles
            .store
            .credentials()
            .create(&Credential::new(subject_id, kind, digest))
            .await?;
        tracing::info!(subject_id = %subject_id, kind = %kind, "credential added");
        Ok(created)
    }

    // ===== Password reset =====

    /// Create a reset token for a subject.
    ///
    /// Any previously active reset token for the subject is invalidated
    /// in the same transaction, so at most one is ever active.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotFound`] for an unknown subject, or an
    /// error from storage.
    pub async fn request_password_reset(&self, subject_id: &str) -> AuthResult<ResetToken> {
        let handles = self.gate.wait().await;
        let Some(subject) = handles.subjects.fetch_by_id(subject_id).await? else {
            return Err(AuthError::not_found("unknown subject"));
        };

        let expires_at = OffsetDateTime::now_utc() + self.config.tokens.reset_lifetime;

        // A transaction dropped on an error path rolls back.
        let mut tx = handles.store.begin().await?;
        let replaced = tx.invalidate_reset_tokens(&subject.id).await?;
        if replaced > 0 {
            tracing::debug!(subject_id = %subject.id, replaced, "replacing active reset token");
        }
        let created = tx
            .create_reset_token(&ResetToken::new(&subject.id, expires_at))
            .await?;
        tx.commit().await?;

        tracing::info!(subject_id = %subject.id, "reset token issued");
        Ok(created)
    }

    /// Redeem a reset token: rotate the subject's password credential and
    /// revoke all of its active sessions, atomically.
    ///
    /// Every rejection leaves the subject's credential and sessions
    /// untouched; a login with the old password still succeeds after a
    /// failed redemption.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for an empty replacement secret,
    /// [`AuthError::NotFound`] for an unknown token or subject,
    /// [`AuthError::Conflict`] for an invalidated or already redeemed
    /// token or an email mismatch, [`AuthError::Expired`] for an expired
    /// token, or an error from hashing or storage.
    pub async fn redeem_password_reset(&self, request: RedeemResetRequest) -> AuthResult<Subject> {
        if request.new_secret.is_empty() {
            return Err(AuthError::validation("secret must not be empty"));
        }

        let handles = self.gate.wait().await;
        let mut tx = handles.store.begin().await?;

        let Some(reset) = tx.find_reset_token(&request.token).await? else {
            return Err(AuthError::not_found("unknown reset token"));
        };
        let now = OffsetDateTime::now_utc();
        if reset.invalidated_at.is_some() {
            return Err(AuthError::conflict("reset token has been invalidated"));
        }
        if reset.redeemed_at.is_some() {
            return Err(AuthError::conflict("reset token already redeemed"));
        }
        if now > reset.expires_at {
            return Err(AuthError::expired("reset token expired"));
        }

        let Some(subject) = tx.find_subject(&reset.subject_id).await? else {
            return Err(AuthError::not_found("unknown subject"));
        };
        if let Some(email) = &request.email {
            if subject.email.as_deref() != Some(email.as_str()) {
                return Err(AuthError::conflict("email does not match reset token"));
            }
        }

        tx.redeem_reset_token(&request.token).await?;
        let digest = self.hasher.hash_async(&request.new_secret, &subject.id).await?;
        tx.create_credential(&Credential::new(&subject.id, PASSWORD_KIND, digest))
            .await?;
        let revoked = tx.invalidate_session_tokens(&subject.id).await?;
        tx.commit().await?;

        for row in &revoked {
            handles.sessions.refresh(&row.token).await?;
        }
        tracing::info!(
            subject_id = %subject.id,
            sessions_revoked = revoked.len(),
            "reset token redeemed"
        );
        Ok(subject)
    }

    // ===== Subject removal =====

    /// Delete a subject, cascading to all owned credentials, session
    /// tokens, and reset tokens. Returns the number of subject rows
    /// deleted.
    ///
    /// Cached session entries for the deleted subject age out by TTL;
    /// validity checks against the store fail immediately.
    ///
    /// # Errors
    ///
    /// In strict mode a zero-row deletion returns
    /// [`AuthError::NotFound`]; storage errors propagate.
    pub async fn remove_subject(&self, subject_id: &str, strict: bool) -> AuthResult<u64> {
        let handles = self.gate.wait().await;
        let deleted = handles.store.subjects().delete(subject_id).await?;
        handles.subjects.evict(subject_id).await?;
        if deleted == 0 && strict {
            return Err(AuthError::not_found("unknown subject"));
        }
        tracing::info!(subject_id = %subject_id, deleted, "subject removed");
        Ok(deleted)
    }

    /// Verify the durable store is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    pub async fn ping(&self) -> AuthResult<()> {
        let handles = self.gate.wait().await;
        handles.store.ping().await?;
        Ok(())
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.config.issuer)
            .field("provider", &self.config.provider)
            .field("connected", &self.gate.is_resolved())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokensmith_db_memory::{MemoryCache, MemoryStore};

    fn config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.token_secret = "test-secret".to_string();
        config.pepper = "test-pepper".to_string();
        config.hashing.memory_kib = 1024;
        config.hashing.iterations = 1;
        config
    }

    fn connected_service() -> AuthService {
        let service = AuthService::new(config()).unwrap();
        service.connect(Arc::new(MemoryStore::new()), Arc::new(MemoryCache::new()));
        service
    }

    fn sign_up_request(id: &str, secret: &str) -> SignUpRequest {
        SignUpRequest {
            id: Some(id.to_string()),
            secret: secret.to_string(),
            ..SignUpRequest::default()
        }
    }

    #[tokio::test]
    async fn test_calls_suspend_until_connected() {
        let service = Arc::new(AuthService::new(config()).unwrap());
        assert!(!service.is_connected());

        let pending = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.sign_up(sign_up_request("u1", "p1")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!pending.is_finished());

        service.connect(Arc::new(MemoryStore::new()), Arc::new(MemoryCache::new()));
        let session = pending.await.unwrap().unwrap();
        assert_eq!(session.subject.id, "u1");
    }

    #[tokio::test]
    async fn test_sign_up_issues_verifiable_session() {
        let service = connected_service();
        let session = service.sign_up(sign_up_request("u1", "p1")).await.unwrap();

        let verified = service.verify_token(&session.token.token).await.unwrap();
        assert_eq!(verified.subject.id, "u1");
        assert_eq!(verified.token.subject_id, "u1");
        assert_eq!(verified.token.provider, "application");
    }

    #[tokio::test]
    async fn test_sign_up_conflict_without_fallback() {
        let service = connected_service();
        service.sign_up(sign_up_request("u1", "p1")).await.unwrap();

        let err = service.sign_up(sign_up_request("u1", "p2")).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_sign_up_fallback_logs_in_existing_subject() {
        let service = connected_service();
        service.sign_up(sign_up_request("u1", "p1")).await.unwrap();

        let mut request = sign_up_request("u1", "p1");
        request.fallback_login = true;
        let session = service.sign_up(request).await.unwrap();
        assert_eq!(session.subject.id, "u1");
    }

    #[tokio::test]
    async fn test_sign_up_fallback_surfaces_original_error() {
        let service = connected_service();
        service.sign_up(sign_up_request("u1", "p1")).await.unwrap();

        // Wrong password: the fallback login fails, and the caller sees
        // the sign-up conflict rather than the login rejection.
        let mut request = sign_up_request("u1", "wrong");
        request.fallback_login = true;
        let err = service.sign_up(request).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_login_merges_unknown_subject_and_bad_password() {
        let service = connected_service();
        service.sign_up(sign_up_request("u1", "p1")).await.unwrap();

        let unknown = service
            .login(SubjectLocator::Id("ghost".to_string()), "p1")
            .await
            .unwrap_err();
        let mismatch = service
            .login(SubjectLocator::Id("u1".to_string()), "wrong")
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), mismatch.to_string());
        assert!(matches!(unknown, AuthError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_login_by_email() {
        let service = connected_service();
        let mut request = sign_up_request("u1", "p1");
        request.email = Some("u1@example.com".to_string());
        service.sign_up(request).await.unwrap();

        let session = service
            .login(SubjectLocator::Email("u1@example.com".to_string()), "p1")
            .await
            .unwrap();
        assert_eq!(session.subject.id, "u1");
    }

    #[tokio::test]
    async fn test_add_credential_rotates_effective_password() {
        let service = connected_service();
        service.sign_up(sign_up_request("u1", "p1")).await.unwrap();

        service.add_credential("u1", PASSWORD_KIND, "p2").await.unwrap();
        assert!(service
            .login(SubjectLocator::Id("u1".to_string()), "p1")
            .await
            .is_err());
        service
            .login(SubjectLocator::Id("u1".to_string()), "p2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_unknown_token_returns_none() {
        let service = connected_service();
        assert!(service.invalidate_token("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_subject_strict() {
        let service = connected_service();
        service.sign_up(sign_up_request("u1", "p1")).await.unwrap();

        assert_eq!(service.remove_subject("u1", true).await.unwrap(), 1);
        let err = service.remove_subject("u1", true).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound { .. }));
        assert_eq!(service.remove_subject("u1", false).await.unwrap(), 0);
    }
}
