//! Bearer token extractors and the login handler.
//!
//! Tokens are accepted from the `Authorization: Bearer` header, with a
//! `?token=` query parameter fallback for clients that cannot set headers.
//! Verification always goes through [`AuthService::verify_token`], so both
//! the stored record and the token signature are checked.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokensmith_storage::Subject;

use crate::error::AuthError;
use crate::service::{AuthService, Session, SubjectLocator};

// =============================================================================
// Auth State
// =============================================================================

/// State required by the bearer extractors and the login handler.
///
/// Include it in your application state and expose it via `FromRef`.
#[derive(Clone)]
pub struct AuthState {
    /// The engine behind every extractor.
    pub service: Arc<AuthService>,
}

impl AuthState {
    /// Creates a new auth state.
    #[must_use]
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }
}

// =============================================================================
// Bearer Extractors
// =============================================================================

/// Extractor that requires a valid bearer token.
///
/// Rejects with an `AuthError` response when the token is missing,
/// unknown, revoked, expired, or badly signed.
pub struct BearerAuth(pub Session);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let Some(token) = extract_bearer_token(parts) else {
            return Err(AuthError::unauthorized("missing bearer token"));
        };

        let session = auth_state
            .service
            .verify_token(&token)
            .await
            .map_err(reject_client_failure)?;
        tracing::debug!(
            subject_id = %session.subject.id,
            endpoint = %parts.uri.path(),
            "bearer token accepted"
        );
        Ok(Self(session))
    }
}

/// At the HTTP boundary every client-side verification failure is the same
/// answer: no valid token, 401. An unknown token in particular must not
/// surface as NotFound. Server-side failures pass through untouched.
fn reject_client_failure(err: AuthError) -> AuthError {
    if err.is_server_error() || err.is_rejection() {
        err
    } else {
        tracing::debug!(error = %err, "bearer token rejected");
        AuthError::unauthorized("invalid session token")
    }
}

/// Extractor that attaches a session when a valid bearer token is present
/// and `None` otherwise. Never rejects.
pub struct OptionalBearerAuth(pub Option<Session>);

impl<S> FromRequestParts<S> for OptionalBearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let Some(token) = extract_bearer_token(parts) else {
            return Ok(Self(None));
        };

        match auth_state.service.verify_token(&token).await {
            Ok(session) => Ok(Self(Some(session))),
            Err(err) => {
                tracing::debug!(error = %err, "optional bearer token rejected");
                Ok(Self(None))
            }
        }
    }
}

/// Pull a bearer token from the `Authorization` header, falling back to
/// the `token` query parameter.
fn extract_bearer_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(token) = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            return Some(token.to_string());
        }
        return None;
    }

    parts
        .uri
        .query()
        .and_then(|query| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("token="))
        })
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
}

// =============================================================================
// Login Handler
// =============================================================================

/// Body accepted by the [`login`] handler.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Locate the subject by stable id.
    #[serde(default)]
    pub id: Option<String>,
    /// Locate the subject by email when no id is given.
    #[serde(default)]
    pub email: Option<String>,
    /// The password.
    pub secret: String,
}

/// Body returned by the [`login`] handler.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    /// The signed bearer token.
    pub token: String,
    /// The authenticated subject's public projection.
    pub subject: Subject,
    /// Data-level expiry of the token, when configured.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expires_at: Option<OffsetDateTime>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            token: session.token.token,
            expires_at: session.token.expires_at,
            subject: session.subject,
        }
    }
}

/// Handler that authenticates a subject and returns a fresh session.
///
/// # Errors
///
/// Rejects with [`AuthError::Validation`] when neither `id` nor `email`
/// is supplied, and otherwise propagates the engine's login errors.
pub async fn login(
    State(state): State<AuthState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AuthError> {
    let locator = match (request.id, request.email) {
        (Some(id), _) => SubjectLocator::Id(id),
        (None, Some(email)) => SubjectLocator::Email(email),
        (None, None) => return Err(AuthError::validation("id or email is required")),
    };
    let session = state.service.login(locator, &request.secret).await?;
    Ok(Json(session.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_header(value: &str) -> Parts {
        let request = Request::builder()
            .uri("/protected")
            .header(AUTHORIZATION, value)
            .body(())
            .unwrap();
        request.into_parts().0
    }

    #[test]
    fn test_extract_from_header() {
        let parts = parts_with_header("Bearer abc.def.ghi");
        assert_eq!(extract_bearer_token(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_rejects_non_bearer_scheme() {
        let parts = parts_with_header("Basic dXNlcjpwYXNz");
        assert!(extract_bearer_token(&parts).is_none());
    }

    #[test]
    fn test_extract_rejects_empty_bearer() {
        let parts = parts_with_header("Bearer ");
        assert!(extract_bearer_token(&parts).is_none());
    }

    #[test]
    fn test_extract_from_query_parameter() {
        let request = Request::builder()
            .uri("/protected?foo=1&token=abc.def.ghi")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        assert_eq!(extract_bearer_token(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_missing_token() {
        let request = Request::builder().uri("/protected").body(()).unwrap();
        let (parts, ()) = request.into_parts();
        assert!(extract_bearer_token(&parts).is_none());
    }

    #[test]
    fn test_unknown_token_failure_becomes_unauthorized() {
        let mapped = reject_client_failure(AuthError::not_found("session token"));
        assert_eq!(mapped.kind(), crate::error::ErrorKind::Unauthorized);
    }

    #[test]
    fn test_server_failures_pass_through_the_boundary() {
        let mapped = reject_client_failure(AuthError::storage("store down"));
        assert_eq!(mapped.kind(), crate::error::ErrorKind::Infrastructure);

        let mapped = reject_client_failure(AuthError::expired("session token expired"));
        assert_eq!(mapped.kind(), crate::error::ErrorKind::Expired);
    }
}
