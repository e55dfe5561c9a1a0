//! Schema migrations for relational storage backends
//!
//! A backend defines its schema as a list of [`Migration`]s and applies them through a
//! [`MigrationManager`], which records applied versions in its own tracking table.
use std::collections::BTreeSet;

use async_trait::async_trait;
use portcullis_core::error::StorageError;
use sqlx::Database;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<MigrationError> for portcullis_core::Error {
    fn from(error: MigrationError) -> Self {
        portcullis_core::Error::Storage(StorageError::Migration(error.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    /// Apply the migration
    async fn up<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Revert the migration
    async fn down<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Unique, strictly increasing version used for ordering
    fn version(&self) -> i64;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// Unix timestamp in seconds
    pub applied_at: i64,
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    fn get_migration_table_name(&self) -> &str {
        "_portcullis_migrations"
    }

    /// Create the tracking table if it does not exist
    async fn initialize(&self) -> Result<()>;

    /// Apply every migration that has not been applied yet, in version order
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Revert applied migrations, newest first
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>>;

    async fn is_applied(&self, version: i64) -> Result<bool>;
}

/// Check that migration versions are positive, unique and listed in ascending order
pub fn check_versions<DB: Database>(migrations: &[Box<dyn Migration<DB>>]) -> Result<()> {
    let mut seen = BTreeSet::new();
    let mut previous = 0;

    for migration in migrations {
        let version = migration.version();
        if version <= 0 {
            return Err(MigrationError::Migration(format!(
                "Migration {} has non-positive version {version}",
                migration.name()
            )));
        }
        if !seen.insert(version) {
            return Err(MigrationError::Migration(format!(
                "Duplicate migration version {version}"
            )));
        }
        if version < previous {
            return Err(MigrationError::Migration(format!(
                "Migration {} (version {version}) is listed after version {previous}",
                migration.name()
            )));
        }
        previous = version;
    }

    tracing::trace!(count = migrations.len(), "Migration versions checked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Any;

    struct Noop(i64);

    #[async_trait]
    impl Migration<Any> for Noop {
        async fn up<'a>(&'a self, _conn: &'a mut <Any as Database>::Connection) -> Result<()> {
            Ok(())
        }

        async fn down<'a>(&'a self, _conn: &'a mut <Any as Database>::Connection) -> Result<()> {
            Ok(())
        }

        fn version(&self) -> i64 {
            self.0
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    fn list(versions: &[i64]) -> Vec<Box<dyn Migration<Any>>> {
        versions
            .iter()
            .map(|v| Box::new(Noop(*v)) as Box<dyn Migration<Any>>)
            .collect()
    }

    #[test]
    fn test_check_versions() {
        assert!(check_versions(&list(&[1, 2, 5])).is_ok());
        assert!(check_versions(&list(&[])).is_ok());
        assert!(check_versions(&list(&[1, 1])).is_err());
        assert!(check_versions(&list(&[2, 1])).is_err());
        assert!(check_versions(&list(&[0])).is_err());
    }

    #[test]
    fn test_error_converts_to_storage_error() {
        let error: portcullis_core::Error = MigrationError::Migration("boom".into()).into();
        assert!(matches!(
            error,
            portcullis_core::Error::Storage(StorageError::Migration(_))
        ));
        assert_eq!(error.kind(), portcullis_core::ErrorKind::Internal);
    }
}
