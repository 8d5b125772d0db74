//! Two-tier read/write facade with fan-out invalidation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tiercache_core::{BusEnvelope, CoreError, InvalidationMessage, Resource};
use tiercache_remote::{Bus, DEFAULT_TOPIC, RemoteError, RemoteStore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::local::{Generation, LocalCache};
use crate::metrics::CacheMetrics;

/// TTLs desde este valor se dispersan para que no expiren juntas.
const SPREAD_THRESHOLD: Duration = Duration::from_secs(300);
const SPREAD_PERCENT: u64 = 10;

/// Dispersa `ttl` hasta un 10% hacia arriba o abajo si llega al umbral.
pub fn spread_ttl(ttl: Duration) -> Duration {
    if ttl < SPREAD_THRESHOLD {
        return ttl;
    }

    let max_millis = ttl.as_millis() as u64 * SPREAD_PERCENT / 100;
    let amount = Duration::from_millis(fastrand::u64(0..max_millis));
    if fastrand::bool() {
        ttl + amount
    } else {
        ttl - amount
    }
}

type RemoteRead = Shared<BoxFuture<'static, Option<Arc<[u8]>>>>;

/// Lectura remota en curso, compartida por los `get` concurrentes de la
/// misma key y version.
struct InFlight {
    id: u64,
    generation: Generation,
    read: RemoteRead,
}

#[derive(Default)]
struct PendingReads {
    next_id: AtomicU64,
    reads: Mutex<HashMap<String, InFlight>>,
}

/// Error de una operacion del coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("remote tier failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("failed to encode or decode cached value: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("producer for '{key}' failed: {error:#}")]
    Producer { key: String, error: anyhow::Error },
}

/// Fachada sobre la cache local, el store remoto y el bus.
///
/// Lee primero de la cache local y luego del store remoto. Cada escritura
/// o invalidacion publica un `deleteCacheKeys` para que el resto de la flota
/// descarte su copia local y vuelva a leer del store remoto.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tiercache_core::Resource;
/// use tiercache_remote::{MemoryBus, MemoryStore};
/// use tiercache_server::cache::{CacheCoordinator, LocalCache, LocalCacheConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), tiercache_server::cache::CoordinatorError> {
/// let coordinator = CacheCoordinator::new(
///     Arc::new(LocalCache::new(LocalCacheConfig::default())),
///     Arc::new(MemoryStore::new()),
///     Arc::new(MemoryBus::new()),
/// );
///
/// coordinator.set(&Resource::Nodes, b"[]".to_vec()).await?;
/// assert!(coordinator.get(&Resource::Nodes).await.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheCoordinator {
    instance_id: Uuid,
    local: Arc<LocalCache>,
    remote: Arc<dyn RemoteStore>,
    bus: Arc<dyn Bus>,
    topic: String,
    metrics: CacheMetrics,
    pending: Arc<PendingReads>,
}

impl CacheCoordinator {
    /// Crea un coordinator con un instance id nuevo y el topic por defecto.
    pub fn new(local: Arc<LocalCache>, remote: Arc<dyn RemoteStore>, bus: Arc<dyn Bus>) -> Self {
        let metrics = local.metrics().clone();
        Self {
            instance_id: Uuid::now_v7(),
            local,
            remote,
            bus,
            topic: DEFAULT_TOPIC.to_string(),
            metrics,
            pending: Arc::new(PendingReads::default()),
        }
    }

    /// Usa un instance id explicito.
    pub fn with_instance_id(mut self, instance_id: Uuid) -> Self {
        self.instance_id = instance_id;
        self
    }

    /// Publica en otro topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn local(&self) -> &Arc<LocalCache> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Obtiene un valor de la cache local o, en miss, del store remoto.
    ///
    /// Un hit remoto se copia a la cache local con el TTL del recurso, salvo
    /// que la key haya cambiado localmente durante la lectura. Los `get`
    /// concurrentes de una misma key comparten una sola lectura remota. Un
    /// fallo del store remoto se trata como miss.
    pub async fn get(&self, resource: &Resource) -> Option<Arc<[u8]>> {
        let start = Instant::now();
        let key = resource.key();

        if let Some(value) = self.local.get(&key) {
            self.metrics.record_local_hit();
            self.metrics
                .record_operation_duration("get_local", start.elapsed());
            return Some(value);
        }

        let value = self.remote_read(key, resource.spec().ttl()).await;
        self.metrics
            .record_operation_duration("get_remote", start.elapsed());
        value
    }

    /// Se une a la lectura en curso de `key` o inicia una nueva.
    ///
    /// Solo se comparte una lectura iniciada en la version actual de la key;
    /// una que empezo antes de un `set` o `delete` podria traer el valor viejo.
    fn remote_read(&self, key: String, ttl: Duration) -> RemoteRead {
        let generation = self.local.generation(&key);
        let mut reads = self.pending.reads.lock();

        if let Some(in_flight) = reads.get(&key)
            && in_flight.generation == generation
        {
            self.metrics.record_coalesced();
            return in_flight.read.clone();
        }

        let id = self.pending.next_id.fetch_add(1, Ordering::Relaxed);
        let remote = Arc::clone(&self.remote);
        let local = Arc::clone(&self.local);
        let pending = Arc::clone(&self.pending);
        let metrics = self.metrics.clone();
        let read_key = key.clone();

        let read = async move {
            let value = match remote.get(&read_key).await {
                Ok(Some(bytes)) => {
                    metrics.record_remote_hit();
                    let value: Arc<[u8]> = bytes.into();
                    if !local.set_if_generation(&read_key, Arc::clone(&value), ttl, generation) {
                        metrics.record_stale_fill();
                        debug!(key = %read_key, "key changed during remote read, not caching locally");
                    }
                    Some(value)
                },
                Ok(None) => {
                    metrics.record_miss();
                    None
                },
                Err(e) => {
                    metrics.record_remote_error("get");
                    metrics.record_miss();
                    warn!(key = %read_key, error = %e, "remote read failed, treating as miss");
                    None
                },
            };

            let mut reads = pending.reads.lock();
            if reads.get(&read_key).is_some_and(|in_flight| in_flight.id == id) {
                reads.remove(&read_key);
            }
            value
        }
        .boxed()
        .shared();

        reads.insert(
            key,
            InFlight {
                id,
                generation,
                read: read.clone(),
            },
        );
        read
    }

    /// Escribe en ambos niveles y publica la invalidacion para las demas
    /// instancias.
    pub async fn set(&self, resource: &Resource, value: Vec<u8>) -> Result<(), CoordinatorError> {
        let start = Instant::now();
        let key = resource.key();
        let ttl = spread_ttl(resource.spec().ttl());

        self.remote
            .set(&key, &value, ttl)
            .await
            .inspect_err(|_| self.metrics.record_remote_error("set"))?;
        self.local.set(&key, value, ttl);
        self.publish(InvalidationMessage::delete_keys([key])?).await?;

        self.metrics
            .record_operation_duration("set", start.elapsed());
        Ok(())
    }

    /// Borra los recursos de ambos niveles y publica un unico
    /// `deleteCacheKeys` con todas las keys.
    pub async fn invalidate(&self, resources: &[Resource]) -> Result<(), CoordinatorError> {
        if resources.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = resources.iter().map(Resource::key).collect();
        for key in &keys {
            self.remote
                .delete(key)
                .await
                .inspect_err(|_| self.metrics.record_remote_error("delete"))?;
            self.local.delete(key);
        }

        self.publish(InvalidationMessage::delete_keys(keys)?).await
    }

    /// Extiende el TTL local de cada recurso y pide lo mismo al resto de la
    /// flota con un `refreshCacheKey` por key.
    pub async fn refresh(&self, resources: &[Resource]) -> Result<(), CoordinatorError> {
        for resource in resources {
            let spec = resource.spec();
            let key = resource.key();
            self.local.refresh(&key, spec.ttl());
            self.publish(InvalidationMessage::refresh_key(key, spec.ttl_seconds()))
                .await?;
        }
        Ok(())
    }

    /// Lee el valor o lo produce, lo guarda y lo retorna.
    ///
    /// El producer solo corre si ambos niveles fallan. Para evitar que
    /// varias instancias lo ejecuten a la vez, envolverlo en un
    /// [`SingleFlightLock`](crate::cache::SingleFlightLock).
    pub async fn get_or_set<F, Fut>(
        &self,
        resource: &Resource,
        producer: F,
    ) -> Result<Arc<[u8]>, CoordinatorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<u8>>>,
    {
        if let Some(value) = self.get(resource).await {
            return Ok(value);
        }

        let value = producer()
            .await
            .map_err(|error| CoordinatorError::Producer {
                key: resource.key(),
                error,
            })?;
        let shared: Arc<[u8]> = Arc::from(value.as_slice());
        self.set(resource, value).await?;
        Ok(shared)
    }

    /// Como [`get`](Self::get), decodificando el valor como JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &Resource,
    ) -> Result<Option<T>, CoordinatorError> {
        match self.get(resource).await {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Como [`set`](Self::set), codificando el valor como JSON.
    pub async fn set_json<T: Serialize>(
        &self,
        resource: &Resource,
        value: &T,
    ) -> Result<(), CoordinatorError> {
        let bytes = serde_json::to_vec(value)?;
        self.set(resource, bytes).await
    }

    /// Como [`get_or_set`](Self::get_or_set), con valores JSON.
    pub async fn get_or_set_json<T, F, Fut>(
        &self,
        resource: &Resource,
        producer: F,
    ) -> Result<T, CoordinatorError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some(value) = self.get_json(resource).await? {
            return Ok(value);
        }

        let value = producer()
            .await
            .map_err(|error| CoordinatorError::Producer {
                key: resource.key(),
                error,
            })?;
        self.set_json(resource, &value).await?;
        Ok(value)
    }

    async fn publish(&self, message: InvalidationMessage) -> Result<(), CoordinatorError> {
        let envelope = BusEnvelope::from_instance(self.instance_id, message);
        self.bus
            .publish(&self.topic, &envelope)
            .await
            .inspect_err(|_| self.metrics.record_remote_error("publish"))?;

        self.metrics.record_published();
        debug!(
            topic = %self.topic,
            pattern = envelope.message.pattern(),
            keys = ?envelope.message.keys(),
            "invalidation published"
        );
        Ok(())
    }
}
