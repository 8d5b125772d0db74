//! Redis-backed remote store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::debug;

use super::RemoteStore;
use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Builds a connection pool from the remote configuration.
pub fn create_pool(config: &RemoteConfig) -> Result<Pool, RemoteError> {
    let mut redis_config = deadpool_redis::Config::from_url(config.url());
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size());
    pool_config.timeouts.wait = Some(config.operation_timeout());
    pool_config.timeouts.create = Some(config.operation_timeout());
    pool_config.timeouts.recycle = Some(config.operation_timeout());
    redis_config.pool = Some(pool_config);

    redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| RemoteError::InvalidConfig(format!("failed to create redis pool: {e}")))
}

/// A [`RemoteStore`] on top of Redis.
///
/// TTLs are sent with millisecond precision (`PX`). The conditional create
/// is a single `SET ... NX PX` command, so two instances can never both
/// observe the key as absent.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    config: RemoteConfig,
}

impl RedisStore {
    /// Creates a store with its own connection pool.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let pool = create_pool(&config)?;
        Ok(Self { pool, config })
    }

    /// Creates a store over an existing pool.
    pub fn with_pool(pool: Pool, config: RemoteConfig) -> Self {
        Self { pool, config }
    }

    /// Runs a remote call under the configured deadline.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let deadline = self.config.operation_timeout();
        tokio::time::timeout(deadline, call)
            .await
            .map_err(|_| RemoteError::timeout(operation, deadline))?
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let key = self.config.prefixed(key);
        self.bounded("get", async {
            let mut conn = self.pool.get().await?;
            let value: Option<Vec<u8>> = conn.get(&key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
        let key = self.config.prefixed(key);
        self.bounded("set", async {
            let mut conn = self.pool.get().await?;
            conn.pset_ex::<_, _, ()>(&key, value, ttl_millis(ttl))
                .await?;
            debug!(key = %key, ttl_ms = ttl_millis(ttl), "remote set");
            Ok(())
        })
        .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, RemoteError> {
        let key = self.config.prefixed(key);
        self.bounded("set_if_absent", async {
            let mut conn = self.pool.get().await?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        let key = self.config.prefixed(key);
        self.bounded("delete", async {
            let mut conn = self.pool.get().await?;
            conn.del::<_, ()>(&key).await?;
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> Result<(), RemoteError> {
        self.bounded("ping", async {
            let mut conn = self.pool.get().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::from_secs(6)), 6000);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
    }

    #[tokio::test]
    async fn test_new_builds_pool_without_connecting() {
        let config = RemoteConfig::builder()
            .url("redis://127.0.0.1:1")
            .key_prefix("test:")
            .build()
            .unwrap();

        let store = RedisStore::new(config).unwrap();
        assert_eq!(store.name(), "redis");
    }
}
