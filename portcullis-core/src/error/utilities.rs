use crate::{
    Error,
    error::{StorageError, ValidationError},
};

/// Extension trait for mapping backend errors into portcullis storage errors
///
/// # Example
///
/// ```rust,ignore
/// use portcullis_core::error::utilities::StorageResultExt;
///
/// sqlx::query("DELETE FROM users WHERE id = ?1")
///     .bind(id)
///     .execute(&pool)
///     .await
///     .map_db_err_with_context("Failed to delete user")?;
/// ```
pub trait StorageResultExt<T> {
    /// Convert a relational database error to a storage error
    fn map_db_err(self) -> Result<T, Error>;

    /// Convert a relational database error to a storage error with additional context
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> StorageResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(format!("{context}: {e}"))))
    }
}

/// Extension trait for Option types to simplify required field validation
pub trait RequiredFieldExt<T> {
    /// Convert None to a ValidationError::MissingField
    fn require_field(self, field_name: &str) -> Result<T, ValidationError>;
}

impl<T> RequiredFieldExt<T> for Option<T> {
    fn require_field(self, field_name: &str) -> Result<T, ValidationError> {
        self.ok_or_else(|| ValidationError::MissingField(format!("{field_name} is required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_db_err_with_context() {
        let error_result: Result<i32, &str> = Err("timeout");
        let mapped = error_result.map_db_err_with_context("Failed to load user");

        match mapped.unwrap_err() {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "Failed to load user: timeout");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_required_field_ext_none() {
        let none_value: Option<String> = None;

        match none_value.require_field("Refresh token").unwrap_err() {
            ValidationError::MissingField(msg) => {
                assert_eq!(msg, "Refresh token is required");
            }
            _ => panic!("Expected missing field validation error"),
        }
    }
}
