//! Process-local cache tier using Moka.

use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::CacheMetrics;

/// Configuracion de la cache local.
#[derive(Debug, Clone)]
pub struct LocalCacheConfig {
    /// Maximo numero de entries (default: 10000)
    pub max_capacity: u64,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

const GENERATION_STRIPES: usize = 64;

/// Version de una key al momento de leerla.
///
/// Cada `set`, `delete` o `clear` la invalida. Se usa para rellenar la
/// cache local desde el store remoto solo si nada cambio la key mientras
/// tanto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    stripe: usize,
    value: u64,
}

/// Entry con su propio deadline.
/// El deadline es mutable para que `refresh` no tenga que re-insertar.
#[derive(Debug)]
struct LocalEntry {
    value: Arc<[u8]>,
    expires_at: Mutex<Instant>,
}

impl LocalEntry {
    fn new(value: Arc<[u8]>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Mutex::new(Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= *self.expires_at.lock()
    }
}

/// Cache local por proceso.
///
/// Cada entry lleva su propio TTL; la expiracion se evalua al leer.
/// Moka solo acota la capacidad. Todas las operaciones son sincronas y
/// seguras desde multiples tareas.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tiercache_server::cache::{LocalCache, LocalCacheConfig};
///
/// let cache = LocalCache::new(LocalCacheConfig::default());
/// cache.set("nodes", b"[]".to_vec(), Duration::from_secs(3600));
///
/// assert_eq!(cache.get("nodes").as_deref(), Some(&b"[]"[..]));
/// cache.delete("nodes");
/// assert!(cache.get("nodes").is_none());
/// ```
#[derive(Clone)]
pub struct LocalCache {
    inner: Cache<String, Arc<LocalEntry>>,
    // Contadores por franja de keys; las escrituras de una franja se
    // serializan bajo su mutex.
    generations: Arc<[Mutex<u64>]>,
    hasher: RandomState,
    metrics: CacheMetrics,
}

impl LocalCache {
    /// Crea una cache local con metricas propias.
    pub fn new(config: LocalCacheConfig) -> Self {
        Self::with_metrics(config, CacheMetrics::new())
    }

    /// Crea una cache local que reporta en las metricas dadas.
    pub fn with_metrics(config: LocalCacheConfig, metrics: CacheMetrics) -> Self {
        let eviction_metrics = metrics.clone();
        let inner = Cache::builder()
            .max_capacity(config.max_capacity)
            .eviction_listener(move |_key, _value, cause| {
                if matches!(cause, RemovalCause::Size) {
                    eviction_metrics.record_eviction("capacity");
                }
            })
            .build();
        let generations = (0..GENERATION_STRIPES).map(|_| Mutex::new(0)).collect();

        Self {
            inner,
            generations,
            hasher: RandomState::new(),
            metrics,
        }
    }

    fn stripe(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) as usize) % self.generations.len()
    }

    /// Obtiene el valor si existe y no ha expirado.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        let entry = self.inner.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(Arc::clone(&entry.value))
    }

    /// Inserta un valor, reemplazando cualquier entry previa.
    pub fn set(&self, key: &str, value: impl Into<Arc<[u8]>>, ttl: Duration) {
        let entry = LocalEntry::new(value.into(), ttl);
        let mut generation = self.generations[self.stripe(key)].lock();
        *generation += 1;
        self.inner.insert(key.to_string(), Arc::new(entry));
    }

    /// Elimina la entry. No-op si no existe.
    pub fn delete(&self, key: &str) {
        let mut generation = self.generations[self.stripe(key)].lock();
        *generation += 1;
        self.inner.invalidate(key);
    }

    /// Elimina todas las entries.
    pub fn clear(&self) {
        for generation in self.generations.iter() {
            *generation.lock() += 1;
        }
        self.inner.invalidate_all();
        self.metrics.update_entry_count(self.entry_count());
    }

    /// Retorna la version actual de `key`.
    pub fn generation(&self, key: &str) -> Generation {
        let stripe = self.stripe(key);
        Generation {
            stripe,
            value: *self.generations[stripe].lock(),
        }
    }

    /// Inserta el valor solo si `key` sigue en la version `seen`.
    ///
    /// Retorna `false` sin tocar la cache si hubo un `set`, `delete` o
    /// `clear` de la key despues de obtener `seen`.
    pub fn set_if_generation(
        &self,
        key: &str,
        value: impl Into<Arc<[u8]>>,
        ttl: Duration,
        seen: Generation,
    ) -> bool {
        let stripe = self.stripe(key);
        let generation = self.generations[stripe].lock();
        if stripe != seen.stripe || *generation != seen.value {
            return false;
        }
        let entry = LocalEntry::new(value.into(), ttl);
        self.inner.insert(key.to_string(), Arc::new(entry));
        true
    }

    /// Extiende el TTL de una entry viva sin tocar su valor.
    ///
    /// Retorna `false` si la entry no existe o ya expiro; en ese caso no
    /// hace nada.
    pub fn refresh(&self, key: &str, ttl: Duration) -> bool {
        let Some(entry) = self.inner.get(key) else {
            return false;
        };

        let now = Instant::now();
        let mut expires_at = entry.expires_at.lock();
        if now >= *expires_at {
            return false;
        }
        *expires_at = now + ttl;
        true
    }

    /// Elimina las entries expiradas y retorna cuantas se eliminaron.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Arc<String>> = self
            .inner
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            self.inner.invalidate(key.as_str());
            self.metrics.record_eviction("ttl");
        }

        if !expired.is_empty() {
            debug!(purged = expired.len(), "purged expired local entries");
        }
        self.metrics.update_entry_count(self.entry_count());
        expired.len()
    }

    /// Retorna el numero de entries, incluyendo las expiradas aun no purgadas.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    /// Retorna las metricas para acceso externo.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}
