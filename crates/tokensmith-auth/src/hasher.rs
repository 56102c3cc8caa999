//! Credential hashing and verification.
//!
//! Secrets are "seasoned" before hashing: the subject identifier and the
//! process-wide pepper are appended to the plaintext, so a stolen digest
//! table cannot be attacked without also knowing the pepper, and identical
//! passwords held by different subjects never produce comparable digests.
//!
//! Hashing uses Argon2id with a random per-digest salt generated from
//! `OsRng`, producing PHC-formatted strings for storage.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::config::HashingConfig;
use crate::error::{AuthError, AuthResult};

/// Hashes and verifies subject credentials.
///
/// Cheap to clone; the pepper and parameters are shared behind an [`Arc`].
#[derive(Clone)]
pub struct CredentialHasher {
    inner: Arc<HasherInner>,
}

struct HasherInner {
    pepper: String,
    params: Params,
}

impl CredentialHasher {
    /// Create a hasher from the configured pepper and Argon2 parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the Argon2 parameters are
    /// outside the ranges the algorithm accepts.
    pub fn new(pepper: impl Into<String>, config: &HashingConfig) -> AuthResult<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|err| {
            AuthError::configuration(format!("invalid argon2 parameters: {err}"))
        })?;

        Ok(Self {
            inner: Arc::new(HasherInner {
                pepper: pepper.into(),
                params,
            }),
        })
    }

    /// Hash a seasoned secret into a PHC-formatted Argon2id digest.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if hashing fails (rare).
    pub fn hash(&self, secret: &str, subject_id: &str) -> AuthResult<String> {
        let seasoned = self.season(secret, subject_id);
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2()
            .hash_password(seasoned.as_bytes(), &salt)
            .map_err(|err| AuthError::internal(format!("credential hashing failed: {err}")))?;
        Ok(digest.to_string())
    }

    /// Verify a seasoned secret against a stored digest.
    ///
    /// Returns `Ok(false)` on a mismatch. A digest that cannot be parsed is
    /// a data integrity problem, not a wrong password, and surfaces as
    /// [`AuthError::Internal`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if the stored digest is malformed.
    pub fn verify(&self, secret: &str, subject_id: &str, digest: &str) -> AuthResult<bool> {
        let seasoned = self.season(secret, subject_id);
        let parsed = PasswordHash::new(digest)
            .map_err(|err| AuthError::internal(format!("malformed credential digest: {err}")))?;

        match self.argon2().verify_password(seasoned.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::internal(format!(
                "credential verification failed: {err}"
            ))),
        }
    }

    /// Hash on a blocking thread.
    ///
    /// Argon2 is deliberately expensive; running it inline would stall the
    /// async executor.
    ///
    /// # Errors
    ///
    /// Same as [`CredentialHasher::hash`].
    pub async fn hash_async(&self, secret: &str, subject_id: &str) -> AuthResult<String> {
        let hasher = self.clone();
        let secret = secret.to_string();
        let subject_id = subject_id.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&secret, &subject_id))
            .await
            .map_err(|err| AuthError::internal(format!("hashing task failed: {err}")))?
    }

    /// Verify on a blocking thread.
    ///
    /// # Errors
    ///
    /// Same as [`CredentialHasher::verify`].
    pub async fn verify_async(
        &self,
        secret: &str,
        subject_id: &str,
        digest: &str,
    ) -> AuthResult<bool> {
        let hasher = self.clone();
        let secret = secret.to_string();
        let subject_id = subject_id.to_string();
        let digest = digest.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &subject_id, &digest))
            .await
            .map_err(|err| AuthError::internal(format!("verification task failed: {err}")))?
    }

    fn season(&self, secret: &str, subject_id: &str) -> String {
        format!("{secret}{subject_id}{}", self.inner.pepper)
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.inner.params.clone())
    }
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        // Minimal parameters keep the tests fast.
        let config = HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        CredentialHasher::new("test-pepper", &config).unwrap()
    }

    #[test]
    fn test_hash_produces_phc_format() {
        let digest = hasher().hash("hunter2", "subject-1").unwrap();
        assert!(digest.starts_with("$argon2id$"), "digest should use Argon2id");
    }

    #[test]
    fn test_verify_correct_secret() {
        let h = hasher();
        let digest = h.hash("hunter2", "subject-1").unwrap();
        assert!(h.verify("hunter2", "subject-1", &digest).unwrap());
    }

    #[test]
    fn test_verify_wrong_secret() {
        let h = hasher();
        let digest = h.hash("hunter2", "subject-1").unwrap();
        assert!(!h.verify("hunter3", "subject-1", &digest).unwrap());
    }

    #[test]
    fn test_verify_wrong_subject() {
        let h = hasher();
        let digest = h.hash("hunter2", "subject-1").unwrap();

        // Seasoning binds the digest to the subject it was created for.
        assert!(!h.verify("hunter2", "subject-2", &digest).unwrap());
    }

    #[test]
    fn test_verify_wrong_pepper() {
        let config = HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        let digest = hasher().hash("hunter2", "subject-1").unwrap();

        let other = CredentialHasher::new("other-pepper", &config).unwrap();
        assert!(!other.verify("hunter2", "subject-1", &digest).unwrap());
    }

    #[test]
    fn test_hash_produces_different_digests() {
        let h = hasher();
        let digest1 = h.hash("hunter2", "subject-1").unwrap();
        let digest2 = h.hash("hunter2", "subject-1").unwrap();

        // Random salts keep identical inputs from colliding.
        assert_ne!(digest1, digest2);
        assert!(h.verify("hunter2", "subject-1", &digest1).unwrap());
        assert!(h.verify("hunter2", "subject-1", &digest2).unwrap());
    }

    #[test]
    fn test_verify_malformed_digest() {
        let err = hasher()
            .verify("hunter2", "subject-1", "not-a-phc-string")
            .unwrap_err();
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let h = hasher();
        let digest = h.hash_async("hunter2", "subject-1").await.unwrap();
        assert!(h.verify_async("hunter2", "subject-1", &digest).await.unwrap());
        assert!(!h.verify_async("wrong", "subject-1", &digest).await.unwrap());
    }
}
