//! JSON error responses for [`AuthError`].

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{AuthError, ErrorKind};

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        // Server-side detail stays in the logs, not on the wire.
        let message = if self.is_server_error() {
            tracing::error!(kind = %kind, error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": kind.as_str(),
            "error_description": message,
        });

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }

        (status, headers, Json(body)).into_response()
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Expired | ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Configuration | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_carries_www_authenticate() {
        let response = AuthError::unauthorized("invalid credentials").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer"))
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::validation("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::not_found("x").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuthError::conflict("x").into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::expired("x").into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::storage("x").into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let response = AuthError::internal("argon2 blew up").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
