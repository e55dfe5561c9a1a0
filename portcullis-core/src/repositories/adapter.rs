use crate::{
    Error, User, UserAccess, UserId,
    repositories::{RepositoryProvider, UserRepository},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Adapter that wraps a RepositoryProvider and implements the individual repository trait
pub struct UserRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> UserRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> UserRepository for UserRepositoryAdapter<R> {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        self.provider.user().find_by_username(username).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        self.provider.user().find_by_id(id).await
    }

    async fn find_access(&self, id: UserId) -> Result<Option<UserAccess>, Error> {
        self.provider.user().find_access(id).await
    }
}
