//! Engine error types.
//!
//! Every entry point reports a stable error kind plus a human-readable
//! reason. Business-rule rejections (`Conflict`, `Expired`, `Unauthorized`)
//! are terminal for the call; infrastructure failures propagate unmodified
//! with no automatic retry.

use std::fmt;

use tokensmith_storage::StorageError;

/// Type alias for engine results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur during credential and session operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Required input was missing or malformed. Reported before any I/O.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the invalid input.
        message: String,
    },

    /// The entity is absent in both cache and store.
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was looked up.
        message: String,
    },

    /// The operation violates a data invariant, such as redeeming an
    /// already-redeemed reset token.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the violated invariant.
        message: String,
    },

    /// A time-based rejection, distinguished from `NotFound` and `Conflict`
    /// so callers can offer a "request a new one" flow.
    #[error("Expired: {message}")]
    Expired {
        /// Description of what expired.
        message: String,
    },

    /// The token signature is invalid or the token has been revoked.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The durable store or cache failed, surfaced after the connection
    /// gate and never swallowed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred, including hashing and signing
    /// failures.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Expired` error.
    #[must_use]
    pub fn expired(message: impl Into<String>) -> Self {
        Self::Expired {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the stable kind tag for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Storage { .. } => ErrorKind::Infrastructure,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns `true` if the failure is attributable to the caller.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::Expired { .. }
                | Self::Unauthorized { .. }
        )
    }

    /// Returns `true` if the failure came from infrastructure rather than a
    /// business rule.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is a business-rule rejection that must leave
    /// no partial state behind.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Expired { .. } | Self::Unauthorized { .. }
        )
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { message } => Self::NotFound { message },
            StorageError::Conflict { message } => Self::Conflict { message },
            StorageError::Serialization { message }
            | StorageError::Transaction { message }
            | StorageError::Unavailable { message } => Self::Storage { message },
        }
    }
}

/// Stable machine-readable error kinds, reported alongside the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed input.
    Validation,
    /// Entity absent in cache and store.
    NotFound,
    /// Data invariant violation.
    Conflict,
    /// Time-based rejection.
    Expired,
    /// Invalid signature or revoked token.
    Unauthorized,
    /// Store or cache failure.
    Infrastructure,
    /// Invalid engine configuration.
    Configuration,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// Returns the kind as a stable string tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Expired => "expired",
            Self::Unauthorized => "unauthorized",
            Self::Infrastructure => "infrastructure",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
