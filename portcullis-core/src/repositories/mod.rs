//! Repository traits for the data access layer
//!
//! This module defines the interfaces the services use to reach their two collaborators:
//!
//! - [`UserRepository`]: the user directory (user lookup by username or id, access resolution)
//! - [`CounterStore`]: the ephemeral key-value store holding attempt counters, lock and block
//!   flags, and revoked token identifiers
//!
//! # Trait Hierarchy
//!
//! - [`UserRepositoryProvider`] provides access to the user directory of a storage backend
//! - [`RepositoryProvider`] combines it with lifecycle methods (migrations, health checks)
//!
//! Services take the individual repository traits. Backends implement [`RepositoryProvider`] and
//! are bridged to the services through [`UserRepositoryAdapter`].

pub mod adapter;
pub mod counter;
pub mod user;

pub use adapter::UserRepositoryAdapter;
pub use counter::CounterStore;
pub use user::UserRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for user repository access.
pub trait UserRepositoryProvider: Send + Sync + 'static {
    /// The user repository implementation type
    type UserRepo: UserRepository;

    /// Get the user repository
    fn user(&self) -> &Self::UserRepo;
}

/// Unified provider for a relational storage backend.
///
/// # Example
///
/// ```rust,ignore
/// use portcullis_core::repositories::*;
///
/// struct MyStorage { user_repo: MyUserRepository }
///
/// impl UserRepositoryProvider for MyStorage {
///     type UserRepo = MyUserRepository;
///     fn user(&self) -> &Self::UserRepo { &self.user_repo }
/// }
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider: UserRepositoryProvider {
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
