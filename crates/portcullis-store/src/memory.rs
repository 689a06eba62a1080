//! In-process store backed by `DashMap`.
//!
//! Used when Redis is disabled (single-instance deployments) and in tests.
//! Expired entries are removed lazily on access and by the sweeper started
//! with [`MemoryStore::spawn_cleanup`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{StoreError, StoreResult};
use crate::traits::SharedStateStore;

/// `now + ttl`, or a value error when the deadline is not representable.
fn deadline(now: Instant, ttl: Duration) -> StoreResult<Instant> {
    now.checked_add(ttl)
        .ok_or_else(|| StoreError::value(format!("ttl of {}s is out of range", ttl.as_secs())))
}

/// A stored value with optional expiry.
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn sweep(entries: &DashMap<String, MemoryEntry>) -> usize {
    let now = Instant::now();
    let mut removed = 0;
    entries.retain(|_, entry| {
        if entry.is_expired(now) {
            removed += 1;
            false
        } else {
            true
        }
    });
    removed
}

/// Local store implementation.
///
/// All operations on a single key go through the `DashMap` entry API, which
/// holds the shard lock for the duration of the read-modify-write. That makes
/// `incr_with_expiry` atomic within this process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Returns `true` when no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        sweep(&self.entries)
    }

    /// Starts a task that sweeps expired entries every `interval`.
    ///
    /// Without it, keys that are never read again (counters of clients that
    /// went away, bans, cached identities) stay in the map for good. The task
    /// holds only a weak reference and ends once every clone of the store is
    /// dropped.
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let entries = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = Weak::upgrade(&entries) else {
                    tracing::debug!("in-process store dropped, stopping cleanup");
                    return;
                };
                let removed = sweep(&entries);
                if removed > 0 {
                    tracing::debug!(removed, remaining = entries.len(), "expired entries swept");
                }
            }
        })
    }

    fn increment(&self, key: &str, window: Option<Duration>) -> StoreResult<i64> {
        let now = Instant::now();
        let expires_at = window.map(|w| deadline(now, w)).transpose()?;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = MemoryEntry {
                        value: "1".to_string(),
                        expires_at,
                    };
                    return Ok(1);
                }
                let current: i64 = entry.value.parse().map_err(|_| {
                    StoreError::value(format!("value at '{key}' is not an integer"))
                })?;
                let next = current + 1;
                entry.value = next.to_string();
                if next == 1 && expires_at.is_some() {
                    entry.expires_at = expires_at;
                }
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryEntry {
                    value: "1".to_string(),
                    expires_at,
                });
                Ok(1)
            }
        }
    }
}

#[async_trait]
impl SharedStateStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let expires_at = deadline(Instant::now(), ttl)?;
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.increment(key, None)
    }

    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StoreResult<i64> {
        self.increment(key, Some(window))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self.entries.get(key).and_then(|entry| match entry.expires_at {
            Some(at) if at > now => Some(at - now),
            _ => None,
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
