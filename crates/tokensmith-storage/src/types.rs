//! Persisted entity types.
//!
//! These are the durable-store rows for the credential and session engine.
//! Token validity is encoded as a nullable invalidation timestamp
//! (`invalidated_at`); a token whose timestamp is set can never become valid
//! again, which makes revocation monotonic by construction.
//!
//! # Security
//!
//! Password digests live only on [`Credential`] rows. [`Subject`] carries no
//! secret material, so the cached subject projection can never leak a hash.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Subject
// =============================================================================

/// An authenticated principal (end user).
///
/// Subjects own credentials, session tokens, and reset tokens; deleting a
/// subject cascades to everything it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    /// Stable identifier. Externally assigned on sign-up, or generated when
    /// the caller does not supply one.
    pub id: String,

    /// Email contact identifier (unique across subjects when present).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Phone contact identifier (unique across subjects when present).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Whether the email address has been verified.
    #[serde(default)]
    pub email_verified: bool,

    /// When the subject was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the subject was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Subject {
    /// Creates a new subject with the given id and no contact identifiers.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            email: None,
            phone: None,
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the email contact identifier.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the phone contact identifier.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

// =============================================================================
// Credential
// =============================================================================

/// A stored password digest of a given kind, owned by a subject.
///
/// Credentials are immutable: a password change creates a new row, and
/// verification always reads the most recently created row of the matching
/// kind. They are never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier for this credential row.
    pub id: Uuid,

    /// Owning subject id.
    pub subject_id: String,

    /// Credential kind tag. A subject may hold several concurrent kinds
    /// (for example a primary and a recovery password).
    pub kind: String,

    /// PHC-formatted Argon2 digest of the seasoned secret.
    pub digest: String,

    /// When this credential was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Credential {
    /// Creates a new credential row for the given subject and kind.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        kind: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            kind: kind.into(),
            digest: digest.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

// =============================================================================
// Session Token
// =============================================================================

/// A bearer session token backed by a durable record.
///
/// The token value is the signed compact token string itself and serves as
/// the primary key. Validity decisions always go through the record, never
/// through the token's self-contained claims alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    /// Opaque high-entropy token value (primary key).
    pub token: String,

    /// Owning subject id.
    pub subject_id: String,

    /// Issuing provider tag, recorded at issuance.
    pub provider: String,

    /// When this token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this token expires (None = no data-level expiry).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expires_at: Option<OffsetDateTime>,

    /// When this token was invalidated (None = still valid).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub invalidated_at: Option<OffsetDateTime>,
}

impl SessionToken {
    /// Creates a new active session token.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        subject_id: impl Into<String>,
        provider: impl Into<String>,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            token: token.into(),
            subject_id: subject_id.into(),
            provider: provider.into(),
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            invalidated_at: None,
        }
    }

    /// Returns `true` if this token has been explicitly revoked.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated_at.is_some()
    }

    /// Returns `true` if this token is past its data-level expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }

    /// Returns `true` if this token is valid at `now` (neither revoked nor
    /// expired).
    #[must_use]
    pub fn is_valid(&self, now: OffsetDateTime) -> bool {
        !self.is_invalidated() && !self.is_expired(now)
    }
}

// =============================================================================
// Reset Token
// =============================================================================

/// A single-use, time-limited token authorizing a credential rotation.
///
/// At most one reset token per subject may be concurrently active; creating
/// a new one invalidates all prior active tokens for that subject. A reset
/// token is mutated exactly once, at redemption, to set `redeemed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetToken {
    /// Opaque token value (primary key).
    pub token: String,

    /// Owning subject id.
    pub subject_id: String,

    /// When this token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When this token was redeemed (None = not yet redeemed).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub redeemed_at: Option<OffsetDateTime>,

    /// When this token was invalidated (None = not invalidated).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub invalidated_at: Option<OffsetDateTime>,
}

impl ResetToken {
    /// Creates a new active reset token with a random value.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            redeemed_at: None,
            invalidated_at: None,
        }
    }

    /// Returns `true` if this token is active at `now`: not expired, not
    /// redeemed, and not invalidated.
    #[must_use]
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.redeemed_at.is_none() && self.invalidated_at.is_none() && now <= self.expires_at
    }
}

// =============================================================================
// Tests
// =============================================================================
