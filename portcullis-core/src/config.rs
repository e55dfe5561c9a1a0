//! Configuration for the authentication services
//!
//! [`AuthConfig`] bundles the settings of every service wired together by
//! [`AuthService`](crate::services::AuthService). Token settings live next to the issuer in
//! [`TokenConfig`].
use std::time::Duration;

use crate::token::TokenConfig;

/// Settings for failed-attempt tracking, lockout and origin blocking.
///
/// # Default Values
///
/// | Setting                    | Default    |
/// | -------------------------- | ---------- |
/// | `enabled`                  | `true`     |
/// | `user_failure_window`      | 15 minutes |
/// | `user_lockout_threshold`   | 5          |
/// | `user_lockout_duration`    | 15 minutes |
/// | `origin_window`            | 15 minutes |
/// | `origin_threshold`         | 10         |
/// | `backoff_base`             | 60 seconds |
/// | `max_block_duration`       | 24 hours   |
/// | `reset_backoff_on_success` | `false`    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbuseGuardConfig {
    /// When disabled every check reports a clean state and nothing is recorded
    pub enabled: bool,

    /// Lifetime of a per-user failure counter, anchored at its first failure
    pub user_failure_window: Duration,

    /// Failures inside the window that lock the username
    pub user_lockout_threshold: u32,

    pub user_lockout_duration: Duration,

    /// Lifetime of a per-origin failure counter, anchored at its first failure
    pub origin_window: Duration,

    /// Failures inside the window that block the origin
    pub origin_threshold: u32,

    /// Duration of the first block. Each further block doubles it.
    pub backoff_base: Duration,

    /// Upper bound on a single block. `None` lets the doubling grow until it saturates.
    pub max_block_duration: Option<Duration>,

    /// Forget the origin's block level after a successful login from it
    pub reset_backoff_on_success: bool,
}

impl Default for AbuseGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_failure_window: Duration::from_secs(15 * 60),
            user_lockout_threshold: 5,
            user_lockout_duration: Duration::from_secs(15 * 60),
            origin_window: Duration::from_secs(15 * 60),
            origin_threshold: 10,
            backoff_base: Duration::from_secs(60),
            max_block_duration: Some(Duration::from_secs(24 * 60 * 60)),
            reset_backoff_on_success: false,
        }
    }
}

impl AbuseGuardConfig {
    /// A configuration that never locks or blocks anything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_user_lockout(mut self, threshold: u32, window: Duration, duration: Duration) -> Self {
        self.user_lockout_threshold = threshold;
        self.user_failure_window = window;
        self.user_lockout_duration = duration;
        self
    }

    pub fn with_origin_blocking(mut self, threshold: u32, window: Duration, base: Duration) -> Self {
        self.origin_threshold = threshold;
        self.origin_window = window;
        self.backoff_base = base;
        self
    }

    pub fn with_max_block_duration(mut self, max: Option<Duration>) -> Self {
        self.max_block_duration = max;
        self
    }

    pub fn with_reset_backoff_on_success(mut self, reset: bool) -> Self {
        self.reset_backoff_on_success = reset;
        self
    }
}

/// Sizing of the bookkeeping worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundConfig {
    pub workers: usize,
    /// Jobs submitted while this many are already queued are dropped
    pub queue_capacity: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 1024,
        }
    }
}

/// Top-level configuration for [`AuthService`](crate::services::AuthService).
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub abuse: AbuseGuardConfig,
    pub tokens: TokenConfig,
    pub background: BackgroundConfig,

    /// Revoke the presented refresh token whenever it is exchanged for a new pair
    pub rotate_refresh_tokens: bool,
}

impl AuthConfig {
    pub fn new(tokens: TokenConfig) -> Self {
        Self {
            abuse: AbuseGuardConfig::default(),
            tokens,
            background: BackgroundConfig::default(),
            rotate_refresh_tokens: false,
        }
    }

    pub fn with_abuse_guard(mut self, abuse: AbuseGuardConfig) -> Self {
        self.abuse = abuse;
        self
    }

    pub fn with_background(mut self, background: BackgroundConfig) -> Self {
        self.background = background;
        self
    }

    pub fn with_refresh_rotation(mut self, rotate: bool) -> Self {
        self.rotate_refresh_tokens = rotate;
        self
    }
}
