use std::sync::Arc;

use chrono::Duration;

use crate::{Error, repositories::CounterStore};

fn blacklist_key(jti: &str) -> String {
    format!("blacklist:{jti}")
}

/// Token revocation list keyed by JTI.
///
/// Entries expire together with the token they revoke, so the list never outgrows the set of
/// still-valid tokens.
pub struct RevocationStore<C: CounterStore> {
    store: Arc<C>,
}

impl<C: CounterStore> Clone for RevocationStore<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<C: CounterStore> RevocationStore<C> {
    pub fn new(store: Arc<C>) -> Self {
        Self { store }
    }

    /// Revoke a token for `ttl`. A non-positive `ttl` means the token already expired and
    /// nothing is stored.
    pub async fn blacklist(&self, jti: &str, ttl: Duration) -> Result<(), Error> {
        if jti.is_empty() {
            tracing::warn!("Refusing to blacklist a token without a JTI");
            return Ok(());
        }

        let Ok(ttl) = ttl.to_std() else {
            return Ok(());
        };
        if ttl.is_zero() {
            return Ok(());
        }

        self.store.set_flag(&blacklist_key(jti), ttl).await?;
        tracing::debug!(jti, ttl_secs = ttl.as_secs(), "Token revoked");
        Ok(())
    }

    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, Error> {
        if jti.is_empty() {
            return Ok(false);
        }
        self.store.exists(&blacklist_key(jti)).await
    }
}
