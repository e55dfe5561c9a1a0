//! Access and refresh tokens
//!
//! Tokens are HS256 JWTs. Access and refresh tokens are signed with independent secrets and carry
//! a `typ` claim, so a token of one kind never verifies as the other.
//!
//! | Claim | Description                                     |
//! | ----- | ----------------------------------------------- |
//! | `sub` | User id as a decimal string                     |
//! | `jti` | Random UUID v4, unique per issued token         |
//! | `iat` | Issued at, seconds since the epoch              |
//! | `exp` | Expiry, seconds since the epoch                 |
//! | `iss` | Configured issuer                               |
//! | `typ` | `access` or `refresh`                           |
mod issuer;

pub use issuer::TokenIssuer;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, UserId, error::ValidationError};

/// Minimum length of a signing secret in bytes
pub const MIN_SECRET_LEN: usize = 32;

pub const DEFAULT_ISSUER: &str = "portcullis";

/// Configuration for token issuance and verification
#[derive(Clone)]
pub struct TokenConfig {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    /// Lifetime of access tokens
    pub access_ttl: Duration,
    /// Lifetime of refresh tokens
    pub refresh_ttl: Duration,
    /// Issuer claim written into and required from every token
    pub issuer: String,
}

impl TokenConfig {
    /// Create a token configuration from two HS256 secrets.
    ///
    /// Both secrets must be at least [`MIN_SECRET_LEN`] bytes long and must differ.
    pub fn new(
        access_secret: impl Into<Vec<u8>>,
        refresh_secret: impl Into<Vec<u8>>,
    ) -> Result<Self, Error> {
        let access_secret = access_secret.into();
        let refresh_secret = refresh_secret.into();

        if access_secret.len() < MIN_SECRET_LEN {
            return Err(ValidationError::InvalidField(format!(
                "Access token secret must be at least {MIN_SECRET_LEN} bytes"
            ))
            .into());
        }
        if refresh_secret.len() < MIN_SECRET_LEN {
            return Err(ValidationError::InvalidField(format!(
                "Refresh token secret must be at least {MIN_SECRET_LEN} bytes"
            ))
            .into());
        }
        if access_secret == refresh_secret {
            return Err(ValidationError::InvalidField(
                "Access and refresh token secrets must differ".to_string(),
            )
            .into());
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            issuer: DEFAULT_ISSUER.to_string(),
        })
    }

    /// Create a configuration with random secrets (for testing)
    #[cfg(test)]
    pub fn new_random() -> Self {
        use rand::RngCore;

        let mut access = vec![0u8; MIN_SECRET_LEN];
        let mut refresh = vec![0u8; MIN_SECRET_LEN];
        rand::rng().fill_bytes(&mut access);
        rand::rng().fill_bytes(&mut refresh);
        Self::new(access, refresh).unwrap()
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub(crate) fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    pub(crate) fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried by both token kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub typ: TokenKind,
}

impl TokenClaims {
    /// The subject parsed as a user id
    pub fn user_id(&self) -> Result<UserId, Error> {
        Ok(self.sub.parse::<UserId>()?)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Time left until expiry. Negative once the token has expired.
    pub fn remaining_lifetime(&self) -> Duration {
        self.expires_at() - Utc::now()
    }
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// The tokens returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub token_type: String,
}

impl TokenPair {
    pub(crate) fn new(access: IssuedToken, refresh: IssuedToken) -> Self {
        Self {
            access_token: access.token,
            access_token_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
            token_type: "Bearer".to_string(),
        }
    }
}
