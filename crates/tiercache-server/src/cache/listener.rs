//! Per-instance consumer of bus invalidation messages.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use tiercache_core::{BusEnvelope, InvalidationMessage};
use tiercache_remote::{Bus, RemoteError, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::coordinator::CacheCoordinator;
use crate::cache::local::LocalCache;
use crate::metrics::CacheMetrics;

/// Estado de la suscripcion al bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    Subscribed,
    Unsubscribed,
}

/// Estado compartido entre el listener, su handle y el health check.
#[derive(Debug, Clone)]
pub struct ListenerStatus {
    state: Arc<RwLock<ListenerState>>,
}

impl ListenerStatus {
    fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ListenerState::Unsubscribed)),
        }
    }

    pub fn get(&self) -> ListenerState {
        *self.state.read()
    }

    pub fn is_subscribed(&self) -> bool {
        self.get() == ListenerState::Subscribed
    }

    fn set(&self, state: ListenerState) {
        *self.state.write() = state;
    }
}

/// Configuration for the invalidation listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Interval between sweeps of expired local entries.
    pub sweep_interval: Duration,
    /// First wait before resubscribing after the stream ends.
    pub initial_backoff: Duration,
    /// Maximum wait between resubscription attempts.
    pub max_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Handle for a running listener.
pub struct ListenerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    status: ListenerStatus,
}

impl ListenerHandle {
    pub fn status(&self) -> &ListenerStatus {
        &self.status
    }

    /// Signals the listener to stop and waits for it to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "invalidation listener task failed");
        }
        self.status.set(ListenerState::Unsubscribed);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.status.set(ListenerState::Unsubscribed);
    }
}

/// Applies bus messages to this instance's local cache.
///
/// Messages published by this same instance are ignored: the coordinator
/// already applied their effect locally.
pub struct InvalidationListener {
    bus: Arc<dyn Bus>,
    topic: String,
    local: Arc<LocalCache>,
    instance_id: Uuid,
    metrics: CacheMetrics,
    config: ListenerConfig,
    status: ListenerStatus,
}

impl InvalidationListener {
    /// Creates a listener for the coordinator's instance, bus and topic.
    pub fn new(coordinator: &CacheCoordinator) -> Self {
        Self {
            bus: Arc::clone(coordinator.bus()),
            topic: coordinator.topic().to_string(),
            local: Arc::clone(coordinator.local()),
            instance_id: coordinator.instance_id(),
            metrics: coordinator.metrics().clone(),
            config: ListenerConfig::default(),
            status: ListenerStatus::new(),
        }
    }

    pub fn with_config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the shared status, valid before and after `start`.
    pub fn status(&self) -> ListenerStatus {
        self.status.clone()
    }

    /// Applies one envelope to the local cache.
    ///
    /// Returns `false` if the envelope came from this instance and was
    /// ignored. Deleting or refreshing an absent key is a no-op.
    pub fn apply(&self, envelope: &BusEnvelope) -> bool {
        if envelope.is_from(self.instance_id) {
            self.metrics.record_ignored();
            return false;
        }

        match &envelope.message {
            InvalidationMessage::DeleteKeys(keys) => {
                for key in keys {
                    self.local.delete(key);
                }
            },
            InvalidationMessage::RefreshKey { key, ttl_seconds } => {
                self.local
                    .refresh(key, Duration::from_secs(*ttl_seconds));
            },
        }

        self.metrics.record_applied(envelope.message.pattern());
        debug!(
            pattern = envelope.message.pattern(),
            keys = ?envelope.message.keys(),
            origin = ?envelope.origin,
            "applied invalidation"
        );
        true
    }

    /// Subscribes to the bus and spawns the processing loop.
    ///
    /// The subscription is active when this returns.
    pub async fn start(self) -> Result<ListenerHandle, RemoteError> {
        let subscription = self.bus.subscribe(&self.topic).await?;
        self.status.set(ListenerState::Subscribed);

        info!(
            topic = %self.topic,
            bus = self.bus.name(),
            instance_id = %self.instance_id,
            "invalidation listener subscribed"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = self.status.clone();
        let task = tokio::spawn(self.run(subscription, shutdown_rx));

        Ok(ListenerHandle {
            shutdown_tx,
            task: Some(task),
            status,
        })
    }

    async fn run(self, mut subscription: Subscription, mut shutdown_rx: watch::Receiver<bool>) {
        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = subscription.next() => match next {
                    Some(envelope) => {
                        self.apply(&envelope);
                    },
                    None => {
                        let closed = RemoteError::SubscriptionClosed { topic: self.topic.clone() };
                        warn!(error = %closed, "invalidation stream ended, resubscribing");
                        self.resync("stream_ended");
                        match self.resubscribe(&mut shutdown_rx).await {
                            Some(fresh) => {
                                // Fills made while unsubscribed may predate a missed invalidation
                                self.resync("resubscribed");
                                subscription = fresh;
                            },
                            None => break,
                        }
                    },
                },
                _ = sweep.tick() => {
                    self.local.purge_expired();
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Invalidation listener shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Drops every local entry after invalidations may have been missed.
    fn resync(&self, reason: &'static str) {
        self.local.clear();
        self.metrics.record_resync(reason);
        info!(reason, "local cache cleared");
    }

    /// Retries the subscription with exponential backoff.
    ///
    /// Returns `None` if shutdown was requested while waiting.
    async fn resubscribe(&self, shutdown_rx: &mut watch::Receiver<bool>) -> Option<Subscription> {
        let mut backoff = self.config.initial_backoff;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        return None;
                    }
                }
            }

            match self.bus.subscribe(&self.topic).await {
                Ok(subscription) => {
                    info!(topic = %self.topic, "invalidation listener resubscribed");
                    return Some(subscription);
                },
                Err(e) => {
                    self.metrics.record_remote_error("subscribe");
                    warn!(error = %e, retry_in = ?backoff, "resubscription failed");
                    backoff = (backoff * 2).min(self.config.max_backoff);
                },
            }
        }
    }
}
