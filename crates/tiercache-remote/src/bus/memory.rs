//! In-process bus built on tokio broadcast channels.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use tiercache_core::BusEnvelope;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::{Bus, Subscription};
use crate::error::RemoteError;

const DEFAULT_CAPACITY: usize = 1024;

/// A [`Bus`] that fans messages out inside one process.
///
/// Payloads travel in their JSON wire form, so subscribers exercise the
/// same decoding path as with a real broker.
#[derive(Debug)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    capacity: usize,
}

impl MemoryBus {
    /// Creates a bus with the default per-topic buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` messages per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, |sender| sender.receiver_count())
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, topic: &str, envelope: &BusEnvelope) -> Result<(), RemoteError> {
        let payload = envelope.encode()?;
        match self.sender(topic).send(payload) {
            Ok(receivers) => debug!(topic = %topic, receivers, "published"),
            Err(_) => debug!(topic = %topic, "published with no subscribers"),
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, RemoteError> {
        let receiver = self.sender(topic).subscribe();

        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => match BusEnvelope::decode(&payload) {
                        Ok(envelope) => return Some((envelope, receiver)),
                        Err(e) => warn!(error = %e, "dropping undecodable bus payload"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bus subscriber lagged, ending subscription");
                        return None;
                    },
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
