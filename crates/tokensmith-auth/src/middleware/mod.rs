//! HTTP middleware for the transport layer.
//!
//! This module provides Axum integration:
//!
//! - Bearer token extraction and verification
//! - A login handler issuing fresh sessions
//! - JSON error responses for [`AuthError`](crate::error::AuthError)
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::{get, post}};
//! use tokensmith_auth::middleware::{AuthState, BearerAuth, login};
//!
//! async fn whoami(BearerAuth(session): BearerAuth) -> String {
//!     session.subject.id
//! }
//!
//! let state = AuthState::new(service);
//! let app = Router::new()
//!     .route("/login", post(login))
//!     .route("/whoami", get(whoami))
//!     .with_state(state);
//! ```

pub mod auth;
pub mod error;

pub use auth::{login, AuthState, BearerAuth, LoginRequest, OptionalBearerAuth, SessionResponse};
