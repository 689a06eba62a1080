//! Cache-aside identity cache over a [`TokenValidator`].
//!
//! Validated identities are stored in the shared store under the SHA-256 of
//! the raw credential, so every gateway instance benefits from a validation
//! done by any other.
//!
//! ## Security Considerations
//!
//! - The lookup key is a hash; the raw credential is never written to the store
//! - Entries never outlive the credential's own `exp`
//! - A corrupt entry is deleted rather than served
//!
//! The cache is only a latency optimization. When the store is unreachable,
//! every call validates directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use portcullis_store::{DynStore, KeyNamespace};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::AuthCacheConfig;
use crate::error::AuthResult;
use crate::identity::Identity;
use crate::token::TokenValidator;

/// Counters for cache effectiveness since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evicted_corrupt: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evicted_corrupt: AtomicU64,
}

/// Resolves credentials to identities, consulting the shared store first.
pub struct AuthenticationCache {
    store: DynStore,
    keys: KeyNamespace,
    validator: Arc<dyn TokenValidator>,
    config: AuthCacheConfig,
    counters: Counters,
}

impl AuthenticationCache {
    pub fn new(
        store: DynStore,
        keys: KeyNamespace,
        validator: Arc<dyn TokenValidator>,
        config: AuthCacheConfig,
    ) -> Self {
        Self {
            store,
            keys,
            validator,
            config,
            counters: Counters::default(),
        }
    }

    /// Store key for `credential`.
    #[must_use]
    pub fn cache_key(&self, credential: &str) -> String {
        self.keys.auth(&hash_credential(credential))
    }

    /// Resolves `credential` to an identity.
    ///
    /// # Errors
    ///
    /// Propagates validator errors. Store errors are logged and never returned.
    pub async fn resolve(&self, credential: &str) -> AuthResult<Identity> {
        if !self.config.enabled {
            return self.validator.validate(credential).await;
        }

        let key = self.cache_key(credential);

        if let Some(identity) = self.lookup(&key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(subject = %identity.subject, "auth cache hit");
            return Ok(identity);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("auth cache miss");

        let identity = self.validator.validate(credential).await?;
        self.write_back(&key, &identity).await;
        Ok(identity)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            evicted_corrupt: self.counters.evicted_corrupt.load(Ordering::Relaxed),
        }
    }

    async fn lookup(&self, key: &str) -> Option<Identity> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "auth cache read failed, validating directly");
                return None;
            }
        };

        match serde_json::from_str::<Identity>(&raw) {
            Ok(identity) if !identity.is_expired() => Some(identity),
            Ok(_) => {
                self.evict(key, "expired").await;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "corrupt auth cache entry");
                self.counters.evicted_corrupt.fetch_add(1, Ordering::Relaxed);
                self.evict(key, "corrupt").await;
                None
            }
        }
    }

    async fn evict(&self, key: &str, reason: &'static str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!(error = %e, reason, "failed to evict auth cache entry");
        }
    }

    async fn write_back(&self, key: &str, identity: &Identity) {
        let Some(ttl) = entry_ttl(self.config.ttl, identity) else {
            return;
        };

        let value = match serde_json::to_string(identity) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize identity for cache");
                return;
            }
        };

        match self.store.set_ex(key, &value, ttl).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(ttl_secs = ttl.as_secs(), "auth cache write");
            }
            Err(e) => tracing::warn!(error = %e, "auth cache write failed"),
        }
    }
}

/// Hex SHA-256 of a raw credential.
#[must_use]
pub fn hash_credential(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

/// Entry TTL: the configured bound, capped by the time left on the credential.
/// `None` when the credential has already expired.
fn entry_ttl(configured: Duration, identity: &Identity) -> Option<Duration> {
    let remaining = identity.seconds_until_expiry();
    if remaining <= 0 {
        return None;
    }
    Some(configured.min(Duration::from_secs(remaining.unsigned_abs())))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use portcullis_store::{MemoryStore, SharedStateStore, StoreError, StoreResult};
    use time::OffsetDateTime;

    use super::*;
    use crate::error::AuthError;

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    /// Accepts credentials of the form `ok:<subject>:<seconds-left>`.
    #[derive(Default)]
    struct CountingValidator {
        calls: AtomicUsize,
    }

    impl CountingValidator {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenValidator for CountingValidator {
        async fn validate(&self, credential: &str) -> AuthResult<Identity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let parts: Vec<&str> = credential.split(':').collect();
            match parts.as_slice() {
                ["ok", subject, left] => {
                    let left: i64 = left.parse().map_err(|_| AuthError::invalid_credential("bad"))?;
                    Ok(Identity::new(*subject, now() + left))
                }
                _ => Err(AuthError::SignatureInvalid),
            }
        }
    }

    /// A store where every call fails as unreachable.
    struct DownStore;

    #[async_trait]
    impl SharedStateStore for DownStore {
        fn backend(&self) -> &'static str {
            "down"
        }
        async fn get(&self, _: &str) -> StoreResult<Option<String>> {
            Err(StoreError::connection("refused"))
        }
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> StoreResult<()> {
            Err(StoreError::connection("refused"))
        }
        async fn delete(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::connection("refused"))
        }
        async fn exists(&self, _: &str) -> StoreResult<bool> {
            Err(StoreError::connection("refused"))
        }
        async fn incr(&self, _: &str) -> StoreResult<i64> {
            Err(StoreError::connection("refused"))
        }
        async fn incr_with_expiry(&self, _: &str, _: Duration) -> StoreResult<i64> {
            Err(StoreError::connection("refused"))
        }
        async fn ttl(&self, _: &str) -> StoreResult<Option<Duration>> {
            Err(StoreError::connection("refused"))
        }
        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::connection("refused"))
        }
    }

    fn cache_over(store: DynStore) -> (AuthenticationCache, Arc<CountingValidator>) {
        let validator = Arc::new(CountingValidator::default());
        let cache = AuthenticationCache::new(
            store,
            KeyNamespace::default(),
            validator.clone(),
            AuthCacheConfig::default(),
        );
        (cache, validator)
    }

    #[tokio::test]
    async fn test_second_resolve_hits_cache() {
        let store = MemoryStore::new();
        let (cache, validator) = cache_over(Arc::new(store.clone()));

        let first = cache.resolve("ok:alice:3600").await.unwrap();
        let second = cache.resolve("ok:alice:3600").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(validator.calls(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().writes, 1);
    }

    #[tokio::test]
    async fn test_key_is_hashed() {
        let store = MemoryStore::new();
        let (cache, _) = cache_over(Arc::new(store.clone()));
        cache.resolve("ok:alice:3600").await.unwrap();

        let key = cache.cache_key("ok:alice:3600");
        assert!(!key.contains("alice"));
        assert_eq!(key.len(), "portcullis:auth:".len() + 64);
        assert!(store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_capped_by_expiry() {
        let store = MemoryStore::new();
        let (cache, _) = cache_over(Arc::new(store.clone()));
        cache.resolve("ok:alice:30").await.unwrap();

        let ttl = store
            .ttl(&cache.cache_key("ok:alice:30"))
            .await
            .unwrap()
            .unwrap();
        assert!(ttl <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_validation_failure_not_cached() {
        let store = MemoryStore::new();
        let (cache, validator) = cache_over(Arc::new(store.clone()));

        let err = cache.resolve("forged").await.unwrap_err();
        assert!(matches!(err, AuthError::SignatureInvalid));
        assert!(store.is_empty());

        cache.resolve("forged").await.unwrap_err();
        assert_eq!(validator.calls(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_deleted() {
        let store = MemoryStore::new();
        let (cache, validator) = cache_over(Arc::new(store.clone()));
        let key = cache.cache_key("ok:alice:3600");
        store
            .set_ex(&key, "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        let identity = cache.resolve("ok:alice:3600").await.unwrap();
        assert_eq!(identity.subject, "alice");
        assert_eq!(validator.calls(), 1);
        assert_eq!(cache.stats().evicted_corrupt, 1);

        // Rewritten with a valid entry.
        let raw = store.get(&key).await.unwrap().unwrap();
        assert!(serde_json::from_str::<Identity>(&raw).is_ok());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = MemoryStore::new();
        let (cache, validator) = cache_over(Arc::new(store.clone()));
        let key = cache.cache_key("ok:alice:3600");
        let stale = serde_json::to_string(&Identity::new("alice", now() - 5)).unwrap();
        store
            .set_ex(&key, &stale, Duration::from_secs(60))
            .await
            .unwrap();

        let identity = cache.resolve("ok:alice:3600").await.unwrap();
        assert!(!identity.is_expired());
        assert_eq!(validator.calls(), 1);
    }

    #[tokio::test]
    async fn test_store_down_validates_directly() {
        let (cache, validator) = cache_over(Arc::new(DownStore));

        assert_eq!(cache.resolve("ok:bob:60").await.unwrap().subject, "bob");
        assert_eq!(cache.resolve("ok:bob:60").await.unwrap().subject, "bob");
        assert_eq!(validator.calls(), 2);
        assert!(matches!(
            cache.resolve("forged").await,
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn test_disabled_cache_always_validates() {
        let store = MemoryStore::new();
        let validator = Arc::new(CountingValidator::default());
        let cache = AuthenticationCache::new(
            Arc::new(store.clone()),
            KeyNamespace::default(),
            validator.clone(),
            AuthCacheConfig {
                enabled: false,
                ..Default::default()
            },
        );

        cache.resolve("ok:alice:60").await.unwrap();
        cache.resolve("ok:alice:60").await.unwrap();
        assert_eq!(validator.calls(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_entry_ttl() {
        let identity = Identity::new("a", now() + 3600);
        assert_eq!(
            entry_ttl(Duration::from_secs(900), &identity),
            Some(Duration::from_secs(900))
        );
        let expired = Identity::new("a", now() - 1);
        assert_eq!(entry_ttl(Duration::from_secs(900), &expired), None);
    }

    #[test]
    fn test_hash_credential() {
        assert_eq!(
            hash_credential("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
