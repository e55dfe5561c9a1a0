//! SQLite user directory for portcullis
//!
//! Provides [`SqliteRepositoryProvider`], which implements
//! [`RepositoryProvider`](portcullis_core::repositories::RepositoryProvider) on top of a `sqlx`
//! SQLite pool, plus the schema migrations for users, roles and permissions.
//!
//! ```rust,ignore
//! use portcullis_storage_sqlite::SqliteRepositoryProvider;
//!
//! let provider = SqliteRepositoryProvider::connect("sqlite://portcullis.db?mode=rwc").await?;
//! provider.migrate().await?;
//! ```
pub mod migrations;
pub mod repositories;

pub use migrations::SqliteMigrationManager;
pub use repositories::{NewUser, SqliteRepositoryProvider, SqliteUserRepository};
