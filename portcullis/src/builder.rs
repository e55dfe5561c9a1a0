//! Builder pattern for constructing Portcullis instances
//!
//! This module provides a type-safe builder for creating [`Portcullis`] instances with
//! compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use portcullis::{AbuseGuardConfig, PortcullisBuilder, TokenConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokens = TokenConfig::new([1u8; 32], [2u8; 32])?;
//!
//!     // Build with SQLite and auto-migration
//!     let portcullis = PortcullisBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_token_config(tokens.clone())
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     // Or tighten the lockout policy and run migrations manually
//!     let portcullis = PortcullisBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_token_config(tokens)
//!         .with_abuse_guard(AbuseGuardConfig::default().with_user_lockout(
//!             3,
//!             Duration::from_secs(600),
//!             Duration::from_secs(1800),
//!         ))
//!         .build()
//!         .await?;
//!     portcullis.migrate().await?;
//!
//!     Ok(())
//! }
//! ```

use std::{sync::Arc, time::Duration};

use portcullis_core::{
    AbuseGuardConfig, AuthConfig, BackgroundConfig, CounterStore, MemoryCounterStore,
    RepositoryProvider, TokenConfig, crypto,
};

use crate::Portcullis;

/// How often expired entries are swept from the default in-memory counter store
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when building a Portcullis instance.
#[derive(Debug, thiserror::Error)]
pub enum PortcullisBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Failed to generate the dummy password hash
    #[error("Password hashing setup failed: {0}")]
    PasswordHashing(String),
}

// ============================================================================
// Type-State Markers
// ============================================================================

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`PortcullisBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
///
/// Contains the repository provider that will be used by Portcullis.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

/// Marker type for the default in-memory counter store.
///
/// The store is created at build time together with its cleanup task.
pub struct DefaultCounters {
    cleanup_interval: Duration,
}

/// Marker type holding a caller supplied counter store.
pub struct WithCounters<C: CounterStore> {
    counters: Arc<C>,
}

// ============================================================================
// Builder Implementation
// ============================================================================

/// A type-safe builder for constructing [`Portcullis`] instances.
///
/// The builder uses a type-state pattern to ensure that storage is configured before building.
/// Token secrets have no sensible default and are checked when building.
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build or add more configuration
/// - [`DefaultCounters`] / [`WithCounters<C>`]: where attempt counters and revoked tokens live
pub struct PortcullisBuilder<Storage, Counters = DefaultCounters> {
    storage: Storage,
    counters: Counters,
    tokens: Option<TokenConfig>,
    abuse: AbuseGuardConfig,
    background: BackgroundConfig,
    rotate_refresh_tokens: bool,
    apply_migrations: bool,
}

impl PortcullisBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            counters: DefaultCounters {
                cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            },
            tokens: None,
            abuse: AbuseGuardConfig::default(),
            background: BackgroundConfig::default(),
            rotate_refresh_tokens: false,
            apply_migrations: false,
        }
    }
}

impl Default for PortcullisBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Counters> PortcullisBuilder<NoStorage, Counters> {
    /// Configure storage with a custom repository provider.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> PortcullisBuilder<WithStorage<R>, Counters> {
        PortcullisBuilder {
            storage: WithStorage { repositories },
            counters: self.counters,
            tokens: self.tokens,
            abuse: self.abuse,
            background: self.background,
            rotate_refresh_tokens: self.rotate_refresh_tokens,
            apply_migrations: self.apply_migrations,
        }
    }
}

#[cfg(feature = "sqlite")]
impl<Counters> PortcullisBuilder<NoStorage, Counters> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use portcullis::{PortcullisBuilder, TokenConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let portcullis = PortcullisBuilder::new()
    ///     .with_sqlite("sqlite://portcullis.db?mode=rwc")
    ///     .await?
    ///     .with_token_config(TokenConfig::new([1u8; 32], [2u8; 32])?)
    ///     .build()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<
        PortcullisBuilder<WithStorage<crate::SqliteRepositoryProvider>, Counters>,
        PortcullisBuilderError,
    > {
        let repositories = crate::SqliteRepositoryProvider::connect(url)
            .await
            .map_err(|e| PortcullisBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_repositories(Arc::new(repositories)))
    }

    /// Configure SQLite storage with an existing connection pool.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> PortcullisBuilder<WithStorage<crate::SqliteRepositoryProvider>, Counters> {
        self.with_repositories(Arc::new(crate::SqliteRepositoryProvider::new(pool)))
    }
}

impl<Storage> PortcullisBuilder<Storage, DefaultCounters> {
    /// Keep counters and revoked tokens in a shared store instead of process memory.
    pub fn with_counter_store<C: CounterStore>(
        self,
        counters: Arc<C>,
    ) -> PortcullisBuilder<Storage, WithCounters<C>> {
        PortcullisBuilder {
            storage: self.storage,
            counters: WithCounters { counters },
            tokens: self.tokens,
            abuse: self.abuse,
            background: self.background,
            rotate_refresh_tokens: self.rotate_refresh_tokens,
            apply_migrations: self.apply_migrations,
        }
    }

    /// Set how often expired entries are swept from the in-memory store.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.counters.cleanup_interval = interval;
        self
    }
}

impl<Storage, Counters> PortcullisBuilder<Storage, Counters> {
    /// Set the token secrets, lifetimes and issuer. Required.
    pub fn with_token_config(mut self, tokens: TokenConfig) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Replace the lockout and origin blocking policy.
    pub fn with_abuse_guard(mut self, config: AbuseGuardConfig) -> Self {
        self.abuse = config;
        self
    }

    /// Size the worker pool that records failed attempts.
    pub fn with_background(mut self, config: BackgroundConfig) -> Self {
        self.background = config;
        self
    }

    /// Revoke each refresh token when it is used.
    pub fn with_refresh_rotation(mut self, rotate: bool) -> Self {
        self.rotate_refresh_tokens = rotate;
        self
    }

    /// Run storage migrations as part of [`build`](PortcullisBuilder::build).
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    fn auth_config(&self) -> Result<AuthConfig, PortcullisBuilderError> {
        let tokens = self.tokens.clone().ok_or_else(|| {
            PortcullisBuilderError::InvalidConfiguration("Token secrets are not configured".into())
        })?;

        if self.background.workers == 0 || self.background.queue_capacity == 0 {
            return Err(PortcullisBuilderError::InvalidConfiguration(
                "Background pool needs at least one worker and one queue slot".into(),
            ));
        }

        Ok(AuthConfig::new(tokens)
            .with_abuse_guard(self.abuse.clone())
            .with_background(self.background)
            .with_refresh_rotation(self.rotate_refresh_tokens))
    }
}

impl<R: RepositoryProvider, Counters> PortcullisBuilder<WithStorage<R>, Counters> {
    async fn prepare(&self) -> Result<AuthConfig, PortcullisBuilderError> {
        let config = self.auth_config()?;

        if self.apply_migrations {
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| PortcullisBuilderError::Migration(e.to_string()))?;
        }

        crypto::prepare_dummy_hash()
            .await
            .map_err(|e| PortcullisBuilderError::PasswordHashing(e.to_string()))?;

        Ok(config)
    }
}

impl<R: RepositoryProvider> PortcullisBuilder<WithStorage<R>, DefaultCounters> {
    /// Build the instance with the in-memory counter store.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Result<Portcullis<R, MemoryCounterStore>, PortcullisBuilderError> {
        let config = self.prepare().await?;

        let counters = Arc::new(MemoryCounterStore::new());
        let (shutdown, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = counters.start_cleanup_task(self.counters.cleanup_interval, shutdown_rx);

        tracing::debug!(
            cleanup_interval_secs = self.counters.cleanup_interval.as_secs(),
            "Using in-memory counter store"
        );

        Ok(Portcullis::from_parts(self.storage.repositories, counters, config)
            .with_cleanup(shutdown, handle))
    }
}

impl<R: RepositoryProvider, C: CounterStore> PortcullisBuilder<WithStorage<R>, WithCounters<C>> {
    /// Build the instance with the configured counter store.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Result<Portcullis<R, C>, PortcullisBuilderError> {
        let config = self.prepare().await?;
        Ok(Portcullis::from_parts(
            self.storage.repositories,
            self.counters.counters,
            config,
        ))
    }
}
