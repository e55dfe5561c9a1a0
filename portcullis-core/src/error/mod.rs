pub mod utilities;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Covers wrong password, unknown user, locked user and blocked origin.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

#[derive(Debug, Error)]
pub enum TokenError {
    /// Malformed, expired, badly signed, wrong algorithm, wrong type or revoked.
    #[error("Invalid token")]
    Invalid,

    #[error("Token mismatch")]
    Mismatch,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Counter store error: {0}")]
    Counter(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// The externally visible error classification.
///
/// Callers at the transport edge should branch on this rather than on the
/// concrete variants, which carry internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCredentials,
    TokenInvalid,
    TokenMismatch,
    PermissionDenied,
    InvalidRequest,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(AuthError::InvalidCredentials) => ErrorKind::InvalidCredentials,
            Error::Auth(AuthError::UserNotFound | AuthError::PermissionDenied(_)) => {
                ErrorKind::PermissionDenied
            }
            Error::Token(TokenError::Invalid) => ErrorKind::TokenInvalid,
            Error::Token(TokenError::Mismatch) => ErrorKind::TokenMismatch,
            Error::Token(TokenError::Signing(_)) => ErrorKind::Internal,
            Error::Validation(_) => ErrorKind::InvalidRequest,
            Error::Storage(_) | Error::Crypto(_) => ErrorKind::Internal,
        }
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let auth_error = Error::Auth(AuthError::InvalidCredentials);
        assert_eq!(
            auth_error.to_string(),
            "Authentication error: Invalid username or password"
        );

        let token_error = Error::Token(TokenError::Invalid);
        assert_eq!(token_error.to_string(), "Token error: Invalid token");

        let storage_error = Error::Storage(StorageError::NotFound);
        assert_eq!(storage_error.to_string(), "Storage error: Record not found");
    }

    #[test]
    fn test_invalid_credentials_message_is_generic() {
        // Wrong password, unknown user, lockout and blocked origin all share this text
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid username or password"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::Auth(AuthError::InvalidCredentials).kind(),
            ErrorKind::InvalidCredentials
        );
        assert_eq!(
            Error::Auth(AuthError::PermissionDenied("User id not provided".into())).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            Error::Auth(AuthError::UserNotFound).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(Error::Token(TokenError::Invalid).kind(), ErrorKind::TokenInvalid);
        assert_eq!(
            Error::Token(TokenError::Mismatch).kind(),
            ErrorKind::TokenMismatch
        );
        assert_eq!(
            Error::Token(TokenError::Signing("boom".into())).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            Error::Storage(StorageError::Counter("down".into())).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            Error::Validation(ValidationError::MissingField("username".into())).kind(),
            ErrorKind::InvalidRequest
        );
    }

    #[test]
    fn test_is_storage_error() {
        assert!(Error::Storage(StorageError::Counter("down".into())).is_storage_error());
        assert!(!Error::Crypto(CryptoError::Task("join".into())).is_storage_error());
    }

    #[test]
    fn test_validation_error_variants() {
        let missing_field = ValidationError::MissingField("username".to_string());
        assert_eq!(
            missing_field.to_string(),
            "Missing required field: username"
        );

        let invalid = ValidationError::InvalidUsername("too long".to_string());
        assert_eq!(invalid.to_string(), "Invalid username: too long");
    }

    #[test]
    fn test_error_from_conversions() {
        let error: Error = AuthError::InvalidCredentials.into();
        assert!(matches!(error, Error::Auth(AuthError::InvalidCredentials)));

        let error: Error = TokenError::Mismatch.into();
        assert!(matches!(error, Error::Token(TokenError::Mismatch)));
    }
}
