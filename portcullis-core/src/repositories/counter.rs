//! Ephemeral counter store interface.
//!
//! The abuse guard and the revocation store keep all of their state here. Implementations must
//! make [`CounterStore::increment`] atomic with respect to concurrent callers on the same key;
//! the services do no locking of their own.

use std::time::Duration;

use async_trait::async_trait;

use crate::Error;

#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Atomically increment the integer stored at `key` and return the new value.
    ///
    /// A missing or expired key starts from zero. When this call creates the key and
    /// `ttl_on_create` is set, the expiry is applied in the same atomic step, so there is no
    /// window in which a fresh counter exists without a TTL.
    async fn increment(&self, key: &str, ttl_on_create: Option<Duration>) -> Result<i64, Error>;

    /// Current integer value of `key`, or `None` if it is missing or expired
    async fn get(&self, key: &str) -> Result<Option<i64>, Error>;

    /// Store a presence flag at `key` that expires after `ttl`, replacing any previous value
    async fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), Error>;

    /// Whether `key` is present and not expired
    async fn exists(&self, key: &str) -> Result<bool, Error>;

    /// Remaining time to live of `key`; `None` if the key is missing or has no expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error>;

    /// Delete `key`, returning whether a live entry was removed
    async fn delete(&self, key: &str) -> Result<bool, Error>;
}
