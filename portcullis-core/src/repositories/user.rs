use crate::{Error, User, UserAccess, UserId};
use async_trait::async_trait;

/// Repository for user directory lookups
///
/// Only reads are required by the login and authorization flows; user administration lives in
/// the storage backends.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Find a user, including a snapshot of the password hash, by username
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, Error>;

    /// Find a user by ID
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error>;

    /// Resolve the roles of a user and the permission codes attached to each role
    ///
    /// Returns `None` when the user does not exist.
    async fn find_access(&self, id: UserId) -> Result<Option<UserAccess>, Error>;
}
