//! Bus trait definition.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tiercache_core::BusEnvelope;

use crate::error::RemoteError;

/// Stream of envelopes delivered to one subscriber.
///
/// A subscription never skips messages silently. The stream ends when the
/// underlying connection is lost or when the subscriber fell behind and
/// messages were dropped. Callers must then assume they missed messages
/// and resubscribe.
pub type Subscription = BoxStream<'static, BusEnvelope>;

/// Fan-out publish/subscribe transport connecting every instance.
///
/// Delivery is unordered across keys. While a subscription stream is open,
/// every subscriber of a topic receives every message published to it,
/// including the publisher's own subscription. Messages published while
/// nobody is subscribed are not replayed.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publishes an envelope to every subscriber of `topic`.
    async fn publish(&self, topic: &str, envelope: &BusEnvelope) -> Result<(), RemoteError>;

    /// Subscribes to `topic`.
    ///
    /// The subscription is active when this returns: messages published
    /// afterwards are delivered to the returned stream.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, RemoteError>;

    /// Returns the name of this bus, for logging.
    fn name(&self) -> &str;
}
