//! Shared state store for the Portcullis gateway.
//!
//! Every gateway instance keeps its cross-instance state here: rate counters,
//! ban flags, cached identities and the externally managed configuration
//! documents. Two backends are provided:
//!
//! - [`RedisStore`]: the production backend, pooled through `deadpool-redis`
//! - [`MemoryStore`]: an in-process `DashMap`, for single-instance runs and tests
//!
//! Both are normally wrapped in a [`TimeoutStore`] so a slow store can never
//! stall request admission.

pub mod config;
pub mod error;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod timeout;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use keys::{DEFAULT_KEY_PREFIX, KeyNamespace};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use timeout::TimeoutStore;
pub use traits::{DynStore, SharedStateStore};

/// Builds the store described by `config`.
///
/// - Disabled store: in-process [`MemoryStore`].
/// - Pool construction fails (bad URL): falls back to [`MemoryStore`] with a warning.
/// - Either way the in-process store gets a sweeper every
///   `config.memory_cleanup_interval`.
/// - Initial ping fails: keeps the Redis backend and warns. Admission fails
///   open until the server becomes reachable.
///
/// The result is always wrapped in a [`TimeoutStore`] bounded by
/// `config.command_timeout`.
pub async fn connect(config: &StoreConfig) -> DynStore {
    let inner: DynStore = if !config.enabled {
        tracing::info!("Shared store disabled, using in-process store");
        Arc::new(memory_store(config))
    } else {
        tracing::info!(url = %config.url, "Connecting to Redis");
        match create_pool(config) {
            Ok(pool) => {
                let store = RedisStore::new(pool);
                match store.ping().await {
                    Ok(()) => tracing::info!("Connected to Redis"),
                    Err(e) => tracing::warn!(
                        error = %e,
                        "Redis not reachable at startup; admission will fail open until it is"
                    ),
                }
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to create Redis pool. Falling back to in-process store."
                );
                Arc::new(memory_store(config))
            }
        }
    };

    Arc::new(TimeoutStore::new(inner, config.command_timeout))
}

fn memory_store(config: &StoreConfig) -> MemoryStore {
    let store = MemoryStore::new();
    // The sweeper stops by itself once the store is dropped.
    drop(store.spawn_cleanup(config.memory_cleanup_interval));
    store
}

fn create_pool(config: &StoreConfig) -> Result<deadpool_redis::Pool, StoreError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    redis_config.pool = Some(pool_config);
    redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| StoreError::connection(e.to_string()))
}
