//! # tokensmith-auth
//!
//! Credential-issuance and session-validation engine.
//!
//! This crate provides:
//! - Salted and peppered password hashing (Argon2id)
//! - Signed bearer session tokens backed by durable records
//! - A read-through/write-through cache in front of the record store
//! - Password reset with atomic credential rotation and session revocation
//! - Axum extractors and handlers for the transport layer
//!
//! ## Overview
//!
//! [`AuthService`] is the single entry point. It is constructed from an
//! [`AuthConfig`], then attached to a record store and key/value cache via
//! [`AuthService::connect`]; calls made before the connection suspend
//! until it happens. The storage traits live in `tokensmith-storage`;
//! `tokensmith-db-memory` ships an embedded backend.
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration
//! - [`error`] - Error taxonomy
//! - [`hasher`] - Password hashing and verification
//! - [`codec`] - Session token signing and validation
//! - [`cache`] - Cache-aside layer over the record store
//! - [`gate`] - One-shot readiness barrier
//! - [`service`] - Orchestration of the full lifecycle
//! - [`middleware`] - Axum bearer extractors and the login handler
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokensmith_auth::{AuthConfig, AuthService, SignUpRequest};
//! use tokensmith_db_memory::{MemoryCache, MemoryStore};
//!
//! let mut config = AuthConfig::default();
//! config.token_secret = std::env::var("TOKEN_SECRET")?;
//! config.pepper = std::env::var("PEPPER")?;
//!
//! let service = AuthService::new(config)?;
//! service.connect(Arc::new(MemoryStore::new()), Arc::new(MemoryCache::new()));
//!
//! let session = service.sign_up(SignUpRequest {
//!     email: Some("u1@example.com".into()),
//!     secret: "hunter2".into(),
//!     ..Default::default()
//! }).await?;
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod gate;
pub mod hasher;
pub mod middleware;
pub mod service;

pub use cache::{EntityCache, SessionTokenCache, SubjectCache};
pub use codec::{SessionClaims, TokenCodec};
pub use config::{AuthConfig, CacheConfig, ConfigError, HashingConfig, TokenConfig};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use gate::ConnectionGate;
pub use hasher::CredentialHasher;
pub use middleware::{AuthState, BearerAuth, OptionalBearerAuth};
pub use service::{
    AuthService, RedeemResetRequest, Session, SignUpRequest, SubjectLocator, PASSWORD_KIND,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tokensmith_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::AuthConfig;
    pub use crate::error::{AuthError, AuthResult, ErrorKind};
    pub use crate::middleware::{login, AuthState, BearerAuth, OptionalBearerAuth};
    pub use crate::service::{
        AuthService, RedeemResetRequest, Session, SignUpRequest, SubjectLocator,
    };
}
