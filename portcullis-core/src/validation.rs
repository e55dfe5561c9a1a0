//! Request sanitization
//!
//! Each request shape has its own typed `sanitize` step that normalizes the
//! fields and rejects malformed input before any service logic runs.
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MAX_USERNAME_LEN: usize = 64;

pub const MAX_PASSWORD_LEN: usize = 128;

/// Upper bound on an encoded token accepted from a client
pub const MAX_TOKEN_LEN: usize = 4096;

/// Lazy-loaded username validation regex
static USERNAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._@+-]+$").expect("Invalid username regex pattern")
});

/// Credentials presented to login
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Trim the username and validate both fields.
    ///
    /// The password is kept byte for byte; surrounding whitespace is part of it.
    pub fn sanitize(self) -> Result<Self, ValidationError> {
        let username = validate_username(&self.username)?;
        validate_password(&self.password)?;

        Ok(Self {
            username,
            password: self.password,
        })
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validates a username and returns it trimmed
///
/// # Examples
///
/// ```rust
/// use portcullis_core::validation::validate_username;
///
/// assert_eq!(validate_username("  alice ").unwrap(), "alice");
/// assert!(validate_username("").is_err());
/// assert!(validate_username("bob smith").is_err());
/// ```
pub fn validate_username(username: &str) -> Result<String, ValidationError> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::MissingField(
            "Username is required".to_string(),
        ));
    }

    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ValidationError::InvalidUsername(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::InvalidUsername(
            "Username contains invalid characters".to_string(),
        ));
    }

    Ok(username.to_string())
}

/// Validates the shape of a presented password. Strength rules do not apply at login.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField(
            "Password is required".to_string(),
        ));
    }

    if password.chars().count() > MAX_PASSWORD_LEN {
        return Err(ValidationError::InvalidPassword(format!(
            "Password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }

    Ok(())
}

/// Trims an encoded token and rejects empty or oversized input
pub fn sanitize_token(token: &str) -> Result<&str, ValidationError> {
    let token = token.trim();

    if token.is_empty() {
        return Err(ValidationError::MissingField("Token is required".to_string()));
    }

    if token.len() > MAX_TOKEN_LEN {
        return Err(ValidationError::InvalidField("Token is too long".to_string()));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_sanitize_trims_username_only() {
        let request = LoginRequest::new("  alice\t", " p@ss ").sanitize().unwrap();
        assert_eq!(request.username, "alice");
        assert_eq!(request.password, " p@ss ");
    }

    #[test]
    fn test_login_request_rejects_empty_fields() {
        assert!(matches!(
            LoginRequest::new("   ", "secret").sanitize(),
            Err(ValidationError::MissingField(_))
        ));
        assert!(matches!(
            LoginRequest::new("alice", "").sanitize(),
            Err(ValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice.smith+ops@example.com").is_ok());
        assert!(validate_username("a".repeat(MAX_USERNAME_LEN).as_str()).is_ok());
        assert!(validate_username("a".repeat(MAX_USERNAME_LEN + 1).as_str()).is_err());
        assert!(validate_username("alice;drop").is_err());
        assert!(validate_username("ali ce").is_err());
    }

    #[test]
    fn test_password_length_limit() {
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LEN)).is_ok());
        assert!(matches!(
            validate_password(&"x".repeat(MAX_PASSWORD_LEN + 1)),
            Err(ValidationError::InvalidPassword(_))
        ));
    }

    #[test]
    fn test_sanitize_token() {
        assert_eq!(sanitize_token("  abc.def.ghi ").unwrap(), "abc.def.ghi");
        assert!(sanitize_token(" ").is_err());
        assert!(sanitize_token(&"a".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let request = LoginRequest::new("alice", "hunter2");
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
