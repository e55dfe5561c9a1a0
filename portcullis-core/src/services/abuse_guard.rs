//! Failed-login tracking with user lockout and origin blocking.
//!
//! Two independent state machines are kept in a [`CounterStore`]:
//!
//! - per username: failures inside a sliding window are counted and, once the lockout threshold is
//!   reached, the username is locked for a fixed duration;
//! - per origin: failures are counted the same way and, once the origin threshold is reached, the
//!   origin is blocked. Every block raises the origin's block level, and the block duration doubles
//!   with each level (`base * 2^(level - 1)`), optionally capped.
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis_core::services::AbuseGuard;
//! use portcullis_core::config::AbuseGuardConfig;
//!
//! let guard = AbuseGuard::new(counters, AbuseGuardConfig::default());
//!
//! if guard.is_user_locked("alice").await? || guard.origin_block("10.0.0.1").await?.blocked {
//!     // Reject with the generic credentials error
//! }
//!
//! // After a failed attempt
//! guard.record_failure("alice", "10.0.0.1").await;
//! ```

use std::{sync::Arc, time::Duration};

use crate::{Error, config::AbuseGuardConfig, repositories::CounterStore};

/// Counter store keys used by the guard
pub mod keys {
    pub fn user_attempts(username: &str) -> String {
        format!("attempts:user:{username}")
    }

    pub fn origin_attempts(origin: &str) -> String {
        format!("attempts:ip:{origin}")
    }

    pub fn user_lock(username: &str) -> String {
        format!("lock:user:{username}")
    }

    pub fn origin_block(origin: &str) -> String {
        format!("block:ip:{origin}")
    }

    pub fn origin_block_level(origin: &str) -> String {
        format!("blockcount:ip:{origin}")
    }
}

/// Whether an origin is currently blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OriginBlock {
    pub blocked: bool,
    /// Time left on the block, if the store reports it
    pub remaining: Option<Duration>,
}

impl OriginBlock {
    /// Seconds a client should wait, rounded up
    pub fn retry_after_seconds(&self) -> Option<u64> {
        self.remaining
            .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0))
    }
}

/// What a failed attempt triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureOutcome {
    /// The attempt locked the username
    pub user_locked: bool,
    /// The attempt blocked the origin for this long
    pub origin_blocked_for: Option<Duration>,
}

/// Service for brute-force and credential-stuffing protection.
///
/// This service is cheap to share across tasks; all state lives in the counter store.
pub struct AbuseGuard<C: CounterStore> {
    store: Arc<C>,
    config: AbuseGuardConfig,
}

impl<C: CounterStore> AbuseGuard<C> {
    pub fn new(store: Arc<C>, config: AbuseGuardConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AbuseGuardConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check whether the username is locked. No side effects.
    pub async fn is_user_locked(&self, username: &str) -> Result<bool, Error> {
        if !self.config.enabled {
            return Ok(false);
        }
        self.store.exists(&keys::user_lock(username)).await
    }

    /// Check whether the origin is blocked and for how long. No side effects.
    pub async fn origin_block(&self, origin: &str) -> Result<OriginBlock, Error> {
        if !self.config.enabled {
            return Ok(OriginBlock::default());
        }

        let key = keys::origin_block(origin);
        if !self.store.exists(&key).await? {
            return Ok(OriginBlock::default());
        }

        Ok(OriginBlock {
            blocked: true,
            remaining: self.store.ttl(&key).await?,
        })
    }

    /// Record a failed attempt for both the username and the origin.
    ///
    /// The two updates are independent: a store error on one side is logged and does not prevent
    /// the other.
    pub async fn record_failure(&self, username: &str, origin: &str) -> FailureOutcome {
        if !self.config.enabled {
            return FailureOutcome::default();
        }

        let (user, origin_result) = tokio::join!(
            self.record_user_failure(username),
            self.record_origin_failure(origin)
        );

        let user_locked = user.unwrap_or_else(|e| {
            tracing::error!(username, error = %e, "Failed to record user login failure");
            false
        });
        let origin_blocked_for = origin_result.unwrap_or_else(|e| {
            tracing::error!(origin, error = %e, "Failed to record origin login failure");
            None
        });

        FailureOutcome {
            user_locked,
            origin_blocked_for,
        }
    }

    /// Count a failure against the username. Returns `true` if this failure locked it.
    pub async fn record_user_failure(&self, username: &str) -> Result<bool, Error> {
        if !self.config.enabled {
            return Ok(false);
        }

        let counter_key = keys::user_attempts(username);
        let attempts = self
            .store
            .increment(&counter_key, Some(self.config.user_failure_window))
            .await?;

        if attempts < i64::from(self.config.user_lockout_threshold) {
            tracing::debug!(username, attempts, "Recorded failed login attempt");
            return Ok(false);
        }

        self.store
            .set_flag(&keys::user_lock(username), self.config.user_lockout_duration)
            .await?;
        self.store.delete(&counter_key).await?;

        tracing::warn!(
            username,
            attempts,
            lockout_secs = self.config.user_lockout_duration.as_secs(),
            "User locked after too many failed login attempts"
        );

        Ok(true)
    }

    /// Count a failure against the origin. Returns the block duration if this failure blocked it.
    pub async fn record_origin_failure(&self, origin: &str) -> Result<Option<Duration>, Error> {
        if !self.config.enabled {
            return Ok(None);
        }

        let counter_key = keys::origin_attempts(origin);
        let attempts = self
            .store
            .increment(&counter_key, Some(self.config.origin_window))
            .await?;

        if attempts < i64::from(self.config.origin_threshold) {
            return Ok(None);
        }

        let level = self
            .store
            .increment(&keys::origin_block_level(origin), None)
            .await?;
        let duration = self.block_duration(level);

        self.store
            .set_flag(&keys::origin_block(origin), duration)
            .await?;
        self.store.delete(&counter_key).await?;

        tracing::warn!(
            origin,
            level,
            block_secs = duration.as_secs(),
            "Origin blocked after too many failed login attempts"
        );

        Ok(Some(duration))
    }

    /// Reset failure counters after a successful login.
    ///
    /// Active locks and blocks are left alone. The block level is only forgotten when
    /// `reset_backoff_on_success` is set.
    pub async fn clear_on_success(&self, username: &str, origin: &str) -> Result<(), Error> {
        if !self.config.enabled {
            return Ok(());
        }

        self.store.delete(&keys::user_attempts(username)).await?;
        self.store.delete(&keys::origin_attempts(origin)).await?;

        if self.config.reset_backoff_on_success {
            self.store.delete(&keys::origin_block_level(origin)).await?;
        }

        Ok(())
    }

    /// Lift a user lock. Returns whether a lock was active.
    pub async fn unlock_user(&self, username: &str) -> Result<bool, Error> {
        let unlocked = self.store.delete(&keys::user_lock(username)).await?;
        self.store.delete(&keys::user_attempts(username)).await?;

        if unlocked {
            tracing::info!(username, "User lock lifted");
        }
        Ok(unlocked)
    }

    /// Lift an origin block. The block level is kept. Returns whether a block was active.
    pub async fn unblock_origin(&self, origin: &str) -> Result<bool, Error> {
        let unblocked = self.store.delete(&keys::origin_block(origin)).await?;
        self.store.delete(&keys::origin_attempts(origin)).await?;

        if unblocked {
            tracing::info!(origin, "Origin block lifted");
        }
        Ok(unblocked)
    }

    /// `base * 2^(level - 1)`, saturating, clamped to the configured maximum
    pub fn block_duration(&self, level: i64) -> Duration {
        let exponent = u32::try_from(level.saturating_sub(1).max(0)).unwrap_or(u32::MAX);
        let factor = 2u32.checked_pow(exponent);

        let duration = factor
            .and_then(|factor| self.config.backoff_base.checked_mul(factor))
            .unwrap_or(Duration::MAX);

        match self.config.max_block_duration {
            Some(max) => duration.min(max),
            None => duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::StorageError, storage::MemoryCounterStore};
    use async_trait::async_trait;

    fn guard(config: AbuseGuardConfig) -> (AbuseGuard<MemoryCounterStore>, Arc<MemoryCounterStore>) {
        let store = Arc::new(MemoryCounterStore::new());
        (AbuseGuard::new(Arc::clone(&store), config), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_locked_at_threshold() {
        let (guard, store) = guard(AbuseGuardConfig::default());

        for _ in 0..4 {
            assert!(!guard.record_user_failure("alice").await.unwrap());
        }
        assert!(!guard.is_user_locked("alice").await.unwrap());
        assert_eq!(store.get("attempts:user:alice").await.unwrap(), Some(4));

        assert!(guard.record_user_failure("alice").await.unwrap());
        assert!(guard.is_user_locked("alice").await.unwrap());
        // Counter is consumed by the lock
        assert_eq!(store.get("attempts:user:alice").await.unwrap(), None);

        let ttl = store.ttl("lock:user:alice").await.unwrap().unwrap();
        assert_eq!(ttl, Duration::from_secs(15 * 60));

        tokio::time::advance(Duration::from_secs(15 * 60)).await;
        assert!(!guard.is_user_locked("alice").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_counter_window_expires() {
        let (guard, _) = guard(AbuseGuardConfig::default());

        for _ in 0..4 {
            guard.record_user_failure("bob").await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(15 * 60 + 1)).await;

        // A fresh window starts, so four more failures do not lock
        for _ in 0..4 {
            assert!(!guard.record_user_failure("bob").await.unwrap());
        }
        assert!(!guard.is_user_locked("bob").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_origin_block_doubles_per_level() {
        let (guard, store) = guard(AbuseGuardConfig::default());

        for _ in 0..9 {
            assert_eq!(guard.record_origin_failure("10.0.0.1").await.unwrap(), None);
        }
        assert_eq!(
            guard.record_origin_failure("10.0.0.1").await.unwrap(),
            Some(Duration::from_secs(60))
        );

        let block = guard.origin_block("10.0.0.1").await.unwrap();
        assert!(block.blocked);
        assert_eq!(block.retry_after_seconds(), Some(60));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!guard.origin_block("10.0.0.1").await.unwrap().blocked);

        for _ in 0..9 {
            guard.record_origin_failure("10.0.0.1").await.unwrap();
        }
        assert_eq!(
            guard.record_origin_failure("10.0.0.1").await.unwrap(),
            Some(Duration::from_secs(120))
        );
        assert_eq!(store.get("blockcount:ip:10.0.0.1").await.unwrap(), Some(2));
        assert_eq!(store.ttl("blockcount:ip:10.0.0.1").await.unwrap(), None);
    }

    #[test]
    fn test_block_duration_law_and_cap() {
        let (guard, _) = guard(AbuseGuardConfig::default());

        assert_eq!(guard.block_duration(1), Duration::from_secs(60));
        assert_eq!(guard.block_duration(2), Duration::from_secs(120));
        assert_eq!(guard.block_duration(5), Duration::from_secs(960));
        assert_eq!(guard.block_duration(11), Duration::from_secs(61_440));
        // Capped at 24 hours
        assert_eq!(guard.block_duration(12), Duration::from_secs(86_400));
        assert_eq!(guard.block_duration(i64::MAX), Duration::from_secs(86_400));
        // Levels below one behave like the first block
        assert_eq!(guard.block_duration(0), Duration::from_secs(60));
    }

    #[test]
    fn test_block_duration_uncapped_saturates() {
        let (guard, _) = guard(AbuseGuardConfig::default().with_max_block_duration(None));

        assert_eq!(guard.block_duration(20), Duration::from_secs(60 * (1 << 19)));
        assert_eq!(guard.block_duration(200), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_on_success_keeps_flags_and_level() {
        let (guard, store) = guard(AbuseGuardConfig::default());

        for _ in 0..10 {
            guard.record_failure("carol", "192.0.2.7").await;
        }
        guard.record_user_failure("dave").await.unwrap();
        guard.record_origin_failure("192.0.2.7").await.unwrap();

        guard.clear_on_success("dave", "192.0.2.7").await.unwrap();

        assert_eq!(store.get("attempts:user:dave").await.unwrap(), None);
        assert_eq!(store.get("attempts:ip:192.0.2.7").await.unwrap(), None);
        assert!(guard.is_user_locked("carol").await.unwrap());
        assert!(guard.origin_block("192.0.2.7").await.unwrap().blocked);
        assert_eq!(store.get("blockcount:ip:192.0.2.7").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_clear_on_success_can_reset_backoff() {
        let (guard, store) =
            guard(AbuseGuardConfig::default().with_reset_backoff_on_success(true));

        store.increment("blockcount:ip:192.0.2.8", None).await.unwrap();
        guard.clear_on_success("erin", "192.0.2.8").await.unwrap();

        assert_eq!(store.get("blockcount:ip:192.0.2.8").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_failure_reports_both_sides() {
        let config = AbuseGuardConfig::default()
            .with_user_lockout(1, Duration::from_secs(60), Duration::from_secs(60))
            .with_origin_blocking(1, Duration::from_secs(60), Duration::from_secs(5));
        let (guard, _) = guard(config);

        let outcome = guard.record_failure("frank", "198.51.100.1").await;
        assert!(outcome.user_locked);
        assert_eq!(outcome.origin_blocked_for, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_disabled_guard_is_noop() {
        let (guard, store) = guard(AbuseGuardConfig::disabled());

        for _ in 0..20 {
            let outcome = guard.record_failure("grace", "203.0.113.1").await;
            assert_eq!(outcome, FailureOutcome::default());
        }

        assert!(!guard.is_user_locked("grace").await.unwrap());
        assert!(!guard.origin_block("203.0.113.1").await.unwrap().blocked);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unlock_and_unblock() {
        let config = AbuseGuardConfig::default()
            .with_user_lockout(1, Duration::from_secs(60), Duration::from_secs(600))
            .with_origin_blocking(1, Duration::from_secs(60), Duration::from_secs(600));
        let (guard, store) = guard(config);

        guard.record_failure("heidi", "203.0.113.2").await;

        assert!(guard.unlock_user("heidi").await.unwrap());
        assert!(!guard.unlock_user("heidi").await.unwrap());
        assert!(!guard.is_user_locked("heidi").await.unwrap());

        assert!(guard.unblock_origin("203.0.113.2").await.unwrap());
        assert!(!guard.origin_block("203.0.113.2").await.unwrap().blocked);
        // Backoff history survives an operator unblock
        assert_eq!(store.get("blockcount:ip:203.0.113.2").await.unwrap(), Some(1));
    }

    /// Counter store whose user keys always fail
    struct FailingUserKeys(MemoryCounterStore);

    impl FailingUserKeys {
        fn check(key: &str) -> Result<(), Error> {
            if key.contains(":user:") {
                return Err(StorageError::Counter("unavailable".into()).into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CounterStore for FailingUserKeys {
        async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<i64, Error> {
            Self::check(key)?;
            self.0.increment(key, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<i64>, Error> {
            Self::check(key)?;
            self.0.get(key).await
        }

        async fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), Error> {
            Self::check(key)?;
            self.0.set_flag(key, ttl).await
        }

        async fn exists(&self, key: &str) -> Result<bool, Error> {
            Self::check(key)?;
            self.0.exists(key).await
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error> {
            Self::check(key)?;
            self.0.ttl(key).await
        }

        async fn delete(&self, key: &str) -> Result<bool, Error> {
            Self::check(key)?;
            self.0.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_user_side_error_does_not_skip_origin_side() {
        let store = Arc::new(FailingUserKeys(MemoryCounterStore::new()));
        let config = AbuseGuardConfig::default()
            .with_origin_blocking(1, Duration::from_secs(60), Duration::from_secs(30));
        let guard = AbuseGuard::new(Arc::clone(&store), config);

        let outcome = guard.record_failure("ivan", "198.51.100.9").await;

        assert!(!outcome.user_locked);
        assert_eq!(outcome.origin_blocked_for, Some(Duration::from_secs(30)));
        assert!(guard.is_user_locked("ivan").await.is_err());
    }
}
