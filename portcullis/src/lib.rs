//! # Portcullis
//!
//! Portcullis guards the front door of a service: it checks usernames and passwords against your
//! own user directory, slows down brute-force attempts, and hands out short-lived access tokens
//! together with longer-lived refresh tokens.
//!
//! - Password login with a constant work path: unknown users, locked users and blocked origins
//!   all cost exactly one Argon2 comparison and produce the same error.
//! - Per-username lockout and per-origin blocking with exponential backoff.
//! - HS256 access and refresh tokens signed with separate secrets.
//! - Logout through a JTI blacklist that forgets entries when the tokens expire.
//! - Role based authorization checks.
//!
//! ## Storage Support
//!
//! The user directory is read through [`RepositoryProvider`]. Portcullis ships with:
//! - SQLite
//!
//! Attempt counters, lock flags and revoked tokens live in a [`CounterStore`]. The default is the
//! in-process [`MemoryCounterStore`]; plug in your own to share state between instances.
//!
//! ## Example
//!
//! ```rust,no_run
//! use portcullis::{LoginRequest, PortcullisBuilder, TokenConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokens = TokenConfig::new(
//!         std::env::var("ACCESS_SECRET")?,
//!         std::env::var("REFRESH_SECRET")?,
//!     )?;
//!
//!     let portcullis = PortcullisBuilder::new()
//!         .with_sqlite("sqlite://portcullis.db?mode=rwc")
//!         .await?
//!         .with_token_config(tokens)
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let login = portcullis
//!         .login(LoginRequest::new("alice", "correct horse"), "203.0.113.7")
//!         .await?;
//!     let claims = portcullis.authenticate(&login.tokens.access_token).await?;
//!     assert!(portcullis.authorize(claims.user_id()?, "reports.read").await?);
//!
//!     portcullis.shutdown().await;
//!     Ok(())
//! }
//! ```
pub mod builder;

use std::sync::Arc;

use portcullis_core::{
    AuthService,
    repositories::UserRepositoryAdapter,
    services::{AbuseGuard, RevocationStore},
};
use tokio::{sync::watch, task::JoinHandle};

pub use builder::{
    DefaultCounters, NoStorage, PortcullisBuilder, PortcullisBuilderError, WithCounters, WithStorage,
};

/// Re-export core types from portcullis_core
///
/// These types are commonly used when working with the Portcullis API.
pub use portcullis_core::{
    AbuseGuardConfig, AuthConfig, BackgroundConfig, CounterStore, Error, ErrorKind, LoginRequest,
    LoginResponse, MemoryCounterStore, RepositoryProvider, Role, RoleId, TokenClaims, TokenConfig,
    TokenKind, TokenPair, User, UserAccess, UserId, crypto::hash_password,
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use portcullis_storage_sqlite::{NewUser, SqliteRepositoryProvider, SqliteUserRepository};

/// Errors that can occur when using Portcullis.
#[derive(Debug, thiserror::Error)]
pub enum PortcullisError {
    /// Error raised by login, token handling or authorization
    #[error("Auth error: {0}")]
    AuthError(Error),
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl PortcullisError {
    /// The classification to report to the client
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortcullisError::AuthError(e) => e.kind(),
            PortcullisError::StorageError(_) => ErrorKind::Internal,
        }
    }
}

impl From<Error> for PortcullisError {
    fn from(e: Error) -> Self {
        if e.is_storage_error() {
            PortcullisError::StorageError(e.to_string())
        } else {
            PortcullisError::AuthError(e)
        }
    }
}

/// Background sweep of expired entries in the in-memory counter store
struct CounterCleanup {
    shutdown: watch::Sender<bool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// The main authentication coordinator.
///
/// Built with [`PortcullisBuilder`]. All methods take `&self` and can be called concurrently; wrap
/// the instance in an [`Arc`] to share it between request handlers.
pub struct Portcullis<R: RepositoryProvider, C: CounterStore = MemoryCounterStore> {
    repositories: Arc<R>,
    auth: AuthService<UserRepositoryAdapter<R>, C>,
    cleanup: Option<CounterCleanup>,
}

impl<R: RepositoryProvider, C: CounterStore> Portcullis<R, C> {
    pub(crate) fn from_parts(repositories: Arc<R>, counters: Arc<C>, config: AuthConfig) -> Self {
        let users = Arc::new(UserRepositoryAdapter::new(Arc::clone(&repositories)));
        let auth = AuthService::new(users, counters, config);

        Self {
            repositories,
            auth,
            cleanup: None,
        }
    }

    pub(crate) fn with_cleanup(
        mut self,
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<()>,
    ) -> Self {
        self.cleanup = Some(CounterCleanup {
            shutdown,
            handle: std::sync::Mutex::new(Some(handle)),
        });
        self
    }

    /// Run migrations of the storage backend
    pub async fn migrate(&self) -> Result<(), PortcullisError> {
        self.repositories
            .migrate()
            .await
            .map_err(|e| PortcullisError::StorageError(e.to_string()))
    }

    /// Check that the storage backend is reachable
    pub async fn health_check(&self) -> Result<(), PortcullisError> {
        self.repositories
            .health_check()
            .await
            .map_err(|e| PortcullisError::StorageError(e.to_string()))
    }

    /// Log a user in with a username and password.
    ///
    /// `origin` identifies where the request came from, usually the client IP address. It is
    /// used for origin blocking only.
    ///
    /// # Errors
    ///
    /// Every rejected attempt fails with [`ErrorKind::InvalidCredentials`], whatever the reason.
    pub async fn login(
        &self,
        request: LoginRequest,
        origin: &str,
    ) -> Result<LoginResponse, PortcullisError> {
        Ok(self.auth.login(request, origin).await?)
    }

    /// Exchange a refresh token for a new access and refresh token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, PortcullisError> {
        Ok(self.auth.refresh(refresh_token).await?)
    }

    /// Revoke the access token behind `access_claims` and the given refresh token.
    ///
    /// `access_claims` come from [`Portcullis::authenticate`].
    pub async fn logout(
        &self,
        access_claims: &TokenClaims,
        refresh_token: &str,
    ) -> Result<(), PortcullisError> {
        Ok(self.auth.logout(access_claims, refresh_token).await?)
    }

    /// Verify a bearer access token
    pub async fn authenticate(&self, access_token: &str) -> Result<TokenClaims, PortcullisError> {
        Ok(self.auth.authenticate(access_token).await?)
    }

    /// Check whether a user holds a permission code
    pub async fn authorize(
        &self,
        user_id: UserId,
        permission_code: &str,
    ) -> Result<bool, PortcullisError> {
        Ok(self.auth.authorization_check(user_id, permission_code).await?)
    }

    /// Lift a username lockout before it expires. Returns whether a lock was in place.
    pub async fn unlock_user(&self, username: &str) -> Result<bool, PortcullisError> {
        Ok(self.auth.abuse_guard().unlock_user(username).await?)
    }

    /// Lift an origin block before it expires. Returns whether a block was in place.
    pub async fn unblock_origin(&self, origin: &str) -> Result<bool, PortcullisError> {
        Ok(self.auth.abuse_guard().unblock_origin(origin).await?)
    }

    pub fn abuse_guard(&self) -> &AbuseGuard<C> {
        self.auth.abuse_guard()
    }

    pub fn revocations(&self) -> &RevocationStore<C> {
        self.auth.revocations()
    }

    pub fn repositories(&self) -> &Arc<R> {
        &self.repositories
    }

    /// Wait until queued failure bookkeeping has been written to the counter store
    pub async fn wait_idle(&self) {
        self.auth.background().wait_idle().await;
    }

    /// Finish queued bookkeeping and stop every background task
    pub async fn shutdown(&self) {
        self.auth.shutdown().await;

        if let Some(cleanup) = &self.cleanup {
            let _ = cleanup.shutdown.send(true);
            let handle = cleanup
                .handle
                .lock()
                .ok()
                .and_then(|mut handle| handle.take());
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Counter cleanup task ended abnormally");
                }
            }
        }
        tracing::info!("Portcullis shut down");
    }
}

impl<R: RepositoryProvider, C: CounterStore> Drop for Portcullis<R, C> {
    fn drop(&mut self) {
        if let Some(cleanup) = &self.cleanup {
            let _ = cleanup.shutdown.send(true);
        }
    }
}
