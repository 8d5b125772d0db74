//! Redis pub/sub bus.

use async_trait::async_trait;
use deadpool_redis::Pool;
use futures_util::{StreamExt, future};
use redis::AsyncCommands;
use tiercache_core::BusEnvelope;
use tracing::{debug, info, warn};

use super::{Bus, Subscription};
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::store::create_pool;

/// A [`Bus`] on top of Redis `PUBLISH`/`SUBSCRIBE`.
///
/// Publishing goes through the shared pool. Each subscription opens a
/// dedicated pub/sub connection, since a subscribed connection cannot
/// issue regular commands.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    pool: Pool,
    config: RemoteConfig,
}

impl RedisBus {
    /// Creates a bus with its own publishing pool.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let pool = create_pool(&config)?;
        Self::with_pool(pool, config)
    }

    /// Creates a bus publishing through an existing pool.
    pub fn with_pool(pool: Pool, config: RemoteConfig) -> Result<Self, RemoteError> {
        let client = redis::Client::open(config.url())?;
        Ok(Self {
            client,
            pool,
            config,
        })
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, topic: &str, envelope: &BusEnvelope) -> Result<(), RemoteError> {
        let payload = envelope.encode()?;
        let deadline = self.config.operation_timeout();

        tokio::time::timeout(deadline, async {
            let mut conn = self.pool.get().await?;
            conn.publish::<_, _, ()>(topic, payload).await?;
            Ok::<_, RemoteError>(())
        })
        .await
        .map_err(|_| RemoteError::timeout("publish", deadline))??;

        debug!(topic = %topic, pattern = envelope.message.pattern(), "published invalidation");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, RemoteError> {
        let deadline = self.config.operation_timeout();

        let pubsub = tokio::time::timeout(deadline, async {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.subscribe(topic).await?;
            Ok::<_, RemoteError>(pubsub)
        })
        .await
        .map_err(|_| RemoteError::timeout("subscribe", deadline))??;

        info!(topic = %topic, "subscribed to invalidation channel");

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| {
                let decoded = match BusEnvelope::decode(msg.get_payload_bytes()) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable bus payload");
                        None
                    },
                };
                future::ready(decoded)
            })
            .boxed();

        Ok(stream)
    }

    fn name(&self) -> &str {
        "redis"
    }
}
