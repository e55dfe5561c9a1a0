//! Password hashing and verification
//!
//! Login compares the presented password against exactly one Argon2 hash per attempt. When no
//! real hash is available (unknown username, locked username) the comparison runs against a
//! process-wide dummy hash produced with the same parameters, so both paths cost the same.
//!
//! Hashing is CPU bound and runs on the blocking thread pool.
use std::sync::OnceLock;

use async_trait::async_trait;
use password_auth::{generate_hash, verify_password};
use rand::RngCore;

use crate::{
    Error,
    error::{AuthError, CryptoError},
};

/// Argon2 hash of a random secret nobody knows
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

fn generate_dummy_hash() -> String {
    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    generate_hash(secret)
}

/// The hash a login attempt is compared against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateHash {
    /// Hash loaded from the user directory
    Stored(String),
    /// Stand-in used when no real hash may be consulted
    Dummy,
}

impl CandidateHash {
    pub fn as_str(&self) -> &str {
        match self {
            CandidateHash::Stored(hash) => hash,
            CandidateHash::Dummy => dummy_hash(),
        }
    }
}

/// Compares a presented password against a candidate hash.
///
/// A mismatch, a dummy candidate and a malformed stored hash all fail with
/// [`AuthError::InvalidCredentials`]. Any other error means the comparison could not run.
#[async_trait]
pub trait PasswordVerifier: Send + Sync + 'static {
    async fn verify(&self, presented: &str, candidate: CandidateHash) -> Result<(), Error>;
}

/// Argon2id verifier backed by `password-auth`
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Verifier;

#[async_trait]
impl PasswordVerifier for Argon2Verifier {
    async fn verify(&self, presented: &str, candidate: CandidateHash) -> Result<(), Error> {
        let presented = presented.to_owned();

        let outcome = tokio::task::spawn_blocking(move || {
            verify_password(presented.as_bytes(), candidate.as_str())
        })
        .await
        .map_err(|e| CryptoError::Task(e.to_string()))?;

        outcome.map_err(|e| {
            tracing::debug!(error = %e, "Password verification failed");
            Error::Auth(AuthError::InvalidCredentials)
        })
    }
}

/// The shared dummy hash.
///
/// Generated on first call unless [`prepare_dummy_hash`] already ran.
pub fn dummy_hash() -> &'static str {
    DUMMY_HASH.get_or_init(generate_dummy_hash)
}

/// Whether the dummy hash has been generated
pub fn dummy_hash_ready() -> bool {
    DUMMY_HASH.get().is_some()
}

/// Generate the dummy hash on the blocking thread pool.
///
/// Run before serving logins, otherwise the first attempt that needs the dummy hash also pays
/// for generating it.
pub async fn prepare_dummy_hash() -> Result<(), Error> {
    if dummy_hash_ready() {
        return Ok(());
    }

    tokio::task::spawn_blocking(|| {
        dummy_hash();
    })
    .await
    .map_err(|e| Error::Crypto(CryptoError::Task(e.to_string())))
}

/// Hash a password for storage in the user directory
pub fn hash_password(password: &str) -> String {
    generate_hash(password)
}

/// [`hash_password`] on the blocking thread pool
pub async fn hash_password_async(password: &str) -> Result<String, Error> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || generate_hash(password))
        .await
        .map_err(|e| Error::Crypto(CryptoError::PasswordHash(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_verify_stored_hash() {
        let hash = hash_password_async("correct horse").await.unwrap();
        let verifier = Argon2Verifier;

        assert!(
            verifier
                .verify("correct horse", CandidateHash::Stored(hash.clone()))
                .await
                .is_ok()
        );

        let err = verifier
            .verify("battery staple", CandidateHash::Stored(hash))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_dummy_hash_never_matches() {
        let err = Argon2Verifier
            .verify("", CandidateHash::Dummy)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_malformed_stored_hash_is_invalid_credentials() {
        let err = Argon2Verifier
            .verify("secret", CandidateHash::Stored("not-a-phc-string".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_prepare_dummy_hash() {
        prepare_dummy_hash().await.unwrap();
        assert!(dummy_hash_ready());

        let hash = dummy_hash();
        prepare_dummy_hash().await.unwrap();
        assert_eq!(dummy_hash(), hash);
    }

    #[test]
    fn test_dummy_hash_is_stable_argon2() {
        assert!(dummy_hash().starts_with("$argon2"));
        assert_eq!(dummy_hash(), CandidateHash::Dummy.as_str());
    }
}
