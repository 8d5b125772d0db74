//! Remote store trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RemoteError;

/// A key-value store shared by every instance of the fleet.
///
/// Every entry carries its own TTL. `set_if_absent` must be a single
/// atomic conditional create; it is what makes fleet-wide locks possible.
///
/// # Implementors
///
/// - `MemoryStore` - process-local, for tests and single-node deployments
/// - `RedisStore` - Redis via a connection pool
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    /// Stores `value` under `key`, replacing any existing entry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError>;

    /// Stores `value` only if `key` is absent.
    ///
    /// Returns `true` if this call created the entry.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, RemoteError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), RemoteError>;

    /// Verifies that the store is reachable.
    async fn health_check(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    /// Returns the name of this store, for logging.
    fn name(&self) -> &str;
}
