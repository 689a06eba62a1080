//! Redis-backed shared store.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::{AsyncCommands, Script};

use crate::error::{StoreError, StoreResult};
use crate::traits::SharedStateStore;

/// Increment and set the window expiry in one server-side step.
///
/// `PEXPIRE` is only issued by the increment that creates the counter, so
/// later hits inside the window never extend it.
const INCR_WITH_EXPIRY_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Store implementation over a `deadpool-redis` connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    incr_script: Script,
}

impl RedisStore {
    /// Wraps an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            incr_script: Script::new(INCR_WITH_EXPIRY_SCRIPT),
        }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> StoreResult<Connection> {
        Ok(self.pool.get().await?)
    }
}

/// Milliseconds for a TTL, never zero. Redis rejects a zero expiry.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SharedStateStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.pset_ex(key, value, ttl_millis(ttl)).await?;
        tracing::trace!(key = %key, ttl_ms = ttl_millis(ttl), "redis set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let count: i64 = conn.incr(key, 1).await?;
        Ok(count)
    }

    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let count: i64 = self
            .incr_script
            .key(key)
            .arg(ttl_millis(window))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn().await?;
        // -2: missing key, -1: no expiry.
        let millis: i64 = conn.pttl(key).await?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::value(format!("unexpected PING reply: {reply}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }
}
