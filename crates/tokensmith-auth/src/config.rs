//! Engine configuration.
//!
//! Plain values only; all behavior lives in the components the values are
//! handed to. Durations deserialize from humantime strings ("1h", "30m").
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://auth.example.com"
//! provider = "example-app"
//! token_secret = "..."
//! pepper = "..."
//!
//! [auth.tokens]
//! session_lifetime = "30d"
//! reset_lifetime = "1h"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer name placed in and required of every signed token.
    pub issuer: String,

    /// Provider tag recorded on issued session tokens. Recommended to be
    /// the name of the application embedding the engine.
    pub provider: String,

    /// Shared secret for token signing.
    pub token_secret: String,

    /// Process-wide secret mixed into every password hash in addition to
    /// the per-subject salt. Not stored alongside any hash.
    pub pepper: String,

    /// Cache configuration.
    pub cache: CacheConfig,

    /// Token lifetime configuration.
    pub tokens: TokenConfig,

    /// Password hashing work factors.
    pub hashing: HashingConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "tokensmith".to_string(),
            provider: "application".to_string(),
            token_secret: String::new(),
            pepper: String::new(),
            cache: CacheConfig::default(),
            tokens: TokenConfig::default(),
            hashing: HashingConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::MissingField { field: "issuer" });
        }
        if self.provider.is_empty() {
            return Err(ConfigError::MissingField { field: "provider" });
        }
        if self.token_secret.is_empty() {
            return Err(ConfigError::MissingField {
                field: "token_secret",
            });
        }
        if self.pepper.is_empty() {
            return Err(ConfigError::MissingField { field: "pepper" });
        }
        if self.cache.namespace.is_empty() {
            return Err(ConfigError::MissingField {
                field: "cache.namespace",
            });
        }
        if self.tokens.reset_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "tokens.reset_lifetime",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.hashing.validate()?;
        Ok(())
    }
}

/// Cache namespace and freshness configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Key namespace all engine entries live under.
    pub namespace: String,

    /// Time-to-live for cached subject projections. `None` keeps them
    /// until the next write-through refresh.
    #[serde(with = "humantime_serde")]
    pub subject_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "auth".to_string(),
            subject_ttl: Some(Duration::from_secs(60 * 60)),
        }
    }
}

/// Token lifetime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Data-level expiry for issued session tokens. `None` issues tokens
    /// that only die by explicit invalidation.
    #[serde(with = "humantime_serde")]
    pub session_lifetime: Option<Duration>,

    /// Lifetime of password reset tokens.
    #[serde(with = "humantime_serde")]
    pub reset_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            session_lifetime: Some(Duration::from_secs(30 * 24 * 60 * 60)),
            // Matches the classic one-hour reset window.
            reset_lifetime: Duration::from_secs(60 * 60),
        }
    }
}

/// Argon2id work factors.
///
/// Defaults target roughly 100ms per hash on commodity hardware; raise the
/// memory or iteration cost as hardware improves.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,

    /// Number of iterations.
    pub iterations: u32,

    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_kib < 8 {
            return Err(ConfigError::InvalidValue {
                field: "hashing.memory_kib",
                reason: "must be at least 8 KiB".to_string(),
            });
        }
        if self.iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "hashing.iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                field: "hashing.parallelism",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required field was left empty.
    #[error("Missing required configuration field: {field}")]
    MissingField {
        /// The empty field.
        field: &'static str,
    },

    /// A field holds a value outside its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why the value is rejected.
        reason: String,
    },
}
