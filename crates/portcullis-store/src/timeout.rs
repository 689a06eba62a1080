//! Bounded-latency decorator for any store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::traits::{DynStore, SharedStateStore};

/// Wraps a store so every operation fails with [`StoreError::Timeout`]
/// instead of waiting longer than `timeout`.
///
/// The admission path never blocks on a slow store: a timed-out call is
/// reported like any other store failure.
#[derive(Clone)]
pub struct TimeoutStore {
    inner: DynStore,
    timeout: Duration,
}

impl TimeoutStore {
    /// Wraps `inner` with the given per-operation bound.
    pub fn new(inner: DynStore, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The configured bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(operation, timeout_ms = self.timeout_ms(), "store call timed out");
                Err(StoreError::Timeout {
                    operation,
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl SharedStateStore for TimeoutStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.bounded("set_ex", self.inner.set_ex(key, value, ttl))
            .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.bounded("exists", self.inner.exists(key)).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.bounded("incr", self.inner.incr(key)).await
    }

    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StoreResult<i64> {
        self.bounded("incr_with_expiry", self.inner.incr_with_expiry(key, window))
            .await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.bounded("ttl", self.inner.ttl(key)).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.bounded("ping", self.inner.ping()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryStore;

    /// A store whose every call hangs for `delay` before delegating.
    struct SlowStore {
        delay: Duration,
        inner: MemoryStore,
    }

    #[async_trait]
    impl SharedStateStore for SlowStore {
        fn backend(&self) -> &'static str {
            "slow"
        }
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(key).await
        }
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.set_ex(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.inner.delete(key).await
        }
        async fn exists(&self, key: &str) -> StoreResult<bool> {
            tokio::time::sleep(self.delay).await;
            self.inner.exists(key).await
        }
        async fn incr(&self, key: &str) -> StoreResult<i64> {
            self.inner.incr(key).await
        }
        async fn incr_with_expiry(&self, key: &str, window: Duration) -> StoreResult<i64> {
            tokio::time::sleep(self.delay).await;
            self.inner.incr_with_expiry(key, window).await
        }
        async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
            self.inner.ttl(key).await
        }
        async fn ping(&self) -> StoreResult<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let slow = Arc::new(SlowStore {
            delay: Duration::from_secs(5),
            inner: MemoryStore::new(),
        });
        let store = TimeoutStore::new(slow, Duration::from_millis(100));

        let err = store
            .incr_with_expiry("k", Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            StoreError::Timeout {
                operation,
                timeout_ms,
            } => {
                assert_eq!(operation, "incr_with_expiry");
                assert_eq!(timeout_ms, 100);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(store.ping().await.unwrap_err().is_unavailable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let fast = Arc::new(SlowStore {
            delay: Duration::from_millis(10),
            inner: MemoryStore::new(),
        });
        let store = TimeoutStore::new(fast, Duration::from_millis(100));

        store
            .set_ex("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.backend(), "slow");
    }
}
