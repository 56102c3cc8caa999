//! Session token encoding and validation.
//!
//! Session tokens are JWTs signed with an HMAC-SHA256 shared secret. The
//! signed compact string doubles as the token's storage key, so a presented
//! bearer value can be checked against both its signature and its stored
//! record.

use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{AuthError, AuthResult};

// =============================================================================
// Claims
// =============================================================================

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Unique token identifier.
    pub jti: String,

    /// Subject the token was issued to.
    pub sub: String,

    /// Issuer of the token.
    pub iss: String,

    /// Issued-at time (Unix seconds).
    pub iat: i64,

    /// Expiry time (Unix seconds); absent for non-expiring tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl SessionClaims {
    /// Build claims for a freshly issued token.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        issuer: impl Into<String>,
        issued_at: OffsetDateTime,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: subject_id.into(),
            iss: issuer.into(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.map(OffsetDateTime::unix_timestamp),
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Signs and validates session tokens with a shared HS256 secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenCodec {
    /// Create a codec from the configured shared secret and issuer.
    #[must_use]
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    /// The issuer written into every signed token.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign claims into a compact JWT string.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if serialization or signing fails.
    pub fn sign(&self, claims: &SessionClaims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| AuthError::internal(format!("token signing failed: {err}")))
    }

    /// Validate a compact JWT string and return its claims.
    ///
    /// The signature, issuer, and encoded expiry are all checked, and all
    /// defects collapse into one rejection class; callers never learn
    /// which check failed. The distinction is logged at debug level only,
    /// which forces every trust decision through the stored token record
    /// rather than the token's self-contained claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] for any invalid token.
    pub fn parse(&self, token: &str) -> AuthResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["iss"]);
        validation.validate_exp = true;

        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => {
                tracing::debug!(error = %err, "session token rejected");
                Err(AuthError::unauthorized("invalid session token"))
            }
        }
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret", "tokensmith-test")
    }

    fn claims(expires_at: Option<OffsetDateTime>) -> SessionClaims {
        SessionClaims::new("subject-1", "tokensmith-test", OffsetDateTime::now_utc(), expires_at)
    }

    #[test]
    fn test_sign_and_parse_round_trip() {
        let c = codec();
        let claims = claims(Some(OffsetDateTime::now_utc() + Duration::hours(1)));
        let token = c.sign(&claims).unwrap();

        let parsed = c.parse(&token).unwrap();
        assert_eq!(parsed, claims);
    }

    #[test]
    fn test_parse_without_expiry() {
        let c = codec();
        let token = c.sign(&claims(None)).unwrap();

        let parsed = c.parse(&token).unwrap();
        assert_eq!(parsed.exp, None);
    }

    #[test]
    fn test_parse_rejects_wrong_secret() {
        let token = codec().sign(&claims(None)).unwrap();

        let other = TokenCodec::new("other-secret", "tokensmith-test");
        let err = other.parse(&token).unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_parse_rejects_wrong_issuer() {
        // Signed with the right secret but a foreign `iss` claim.
        let foreign =
            SessionClaims::new("subject-1", "someone-else", OffsetDateTime::now_utc(), None);
        let token = codec().sign(&foreign).unwrap();

        let err = codec().parse(&token).unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_parse_rejects_expired_token() {
        let c = codec();
        let stale = SessionClaims::new(
            "subject-1",
            "tokensmith-test",
            OffsetDateTime::now_utc() - Duration::hours(2),
            Some(OffsetDateTime::now_utc() - Duration::hours(1)),
        );
        let token = c.sign(&stale).unwrap();

        let err = c.parse(&token).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unauthorized);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = codec().parse("not.a.token").unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_jti_is_unique() {
        let a = claims(None);
        let b = claims(None);
        assert_ne!(a.jti, b.jti);
    }
}
