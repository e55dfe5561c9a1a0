use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::{Error, repositories::CounterStore};

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: i64,
    expires_at: Option<Instant>,
}

impl Slot {
    const EMPTY: Slot = Slot {
        value: 0,
        expires_at: None,
    };

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Counter store backed by a concurrent hash map.
///
/// Expiry uses tokio's clock, so tests running with a paused runtime can advance time
/// deterministically. Expired entries are treated as absent on read and are removed either lazily
/// or by [`MemoryCounterStore::purge_expired`].
///
/// Each key is updated while holding its shard lock, which makes `increment` atomic, including the
/// TTL applied on creation.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, Slot>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Start a background task that periodically purges expired entries.
    ///
    /// # Arguments
    ///
    /// * `interval` - How often to purge
    /// * `shutdown` - A watch receiver that signals when to stop the task
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            tracing::debug!(count = purged, "Purged expired counter store entries");
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down counter store cleanup task");
                        break;
                    }
                }
            }
        })
    }

    fn live(&self, key: &str) -> Option<Slot> {
        let now = Instant::now();
        let slot = *self.entries.get(key)?;
        if slot.is_expired(now) {
            self.entries.remove_if(key, |_, slot| slot.is_expired(now));
            return None;
        }
        Some(slot)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, ttl_on_create: Option<Duration>) -> Result<i64, Error> {
        let now = Instant::now();
        let mut slot = self.entries.entry(key.to_string()).or_insert(Slot::EMPTY);

        if slot.is_expired(now) {
            *slot = Slot::EMPTY;
        }
        if slot.value == 0 {
            slot.expires_at = ttl_on_create.and_then(|ttl| now.checked_add(ttl));
        }
        slot.value = slot.value.saturating_add(1);

        Ok(slot.value)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, Error> {
        Ok(self.live(key).map(|slot| slot.value))
    }

    async fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), Error> {
        self.entries.insert(
            key.to_string(),
            Slot {
                value: 1,
                // A TTL past the clock's range never expires
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }
}
