//! Storage error types.
//!
//! Every gateway operation returns [`StorageResult`]. The variants separate
//! domain-level outcomes (missing rows, uniqueness conflicts) from
//! infrastructure failures so callers can map them onto their own taxonomy.

/// Errors that can occur during record store or cache operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("Record not found: {message}")]
    NotFound {
        /// Description of what was looked up.
        message: String,
    },

    /// The operation violates a uniqueness or state constraint.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the violated constraint.
        message: String,
    },

    /// A value could not be serialized or deserialized at the cache boundary.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the transcoding failure.
        message: String,
    },

    /// A transaction could not be started, committed, or rolled back.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Description of the transaction failure.
        message: String,
    },

    /// The backing store or cache is unreachable.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the connectivity failure.
        message: String,
    },
}

impl StorageError {
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

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `Transaction` error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Returns `true` if the error describes a missing record rather than a
    /// failed operation.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the error is transient infrastructure trouble.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Transaction { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Type alias for storage operation results.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("subject u1");
        assert_eq!(err.to_string(), "Record not found: subject u1");

        let err = StorageError::conflict("email already registered");
        assert_eq!(err.to_string(), "Conflict: email already registered");
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::not_found("x").is_not_found());
        assert!(!StorageError::conflict("x").is_not_found());
        assert!(StorageError::unavailable("down").is_infrastructure());
        assert!(!StorageError::not_found("x").is_infrastructure());
    }
}
