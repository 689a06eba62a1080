//! The shared state store contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

/// A distributed key-value store shared by every gateway instance.
///
/// Counters, ban flags, cached identities and the externally published
/// configuration documents all live here. Values are UTF-8 strings.
///
/// Implementations must make [`incr_with_expiry`](Self::incr_with_expiry)
/// a single indivisible operation: the expiry is attached only by the
/// increment that moves the counter from 0 to 1.
#[async_trait]
pub trait SharedStateStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Reads a value. Returns `None` when the key does not exist or has expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Removes a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Returns `true` if the key currently exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomically increments an integer counter, creating it at 0 first if needed.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Atomically increments a counter and, only when the result is 1,
    /// sets its expiry to `window`.
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StoreResult<i64>;

    /// Remaining time to live of a key, `None` if the key is missing or persistent.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Round trip used by readiness checks.
    async fn ping(&self) -> StoreResult<()>;
}

/// Shared, dynamically dispatched store handle.
pub type DynStore = Arc<dyn SharedStateStore>;
