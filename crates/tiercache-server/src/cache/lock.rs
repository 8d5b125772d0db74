//! Fleet-wide single-flight guard on top of the remote store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tiercache_remote::{RemoteError, RemoteStore};
use tracing::{debug, warn};

use crate::metrics::CacheMetrics;

/// Valor almacenado en la key del lock.
const LOCK_SENTINEL: &[u8] = b"true";

/// Resultado de un intento de ejecucion.
#[derive(Debug, PartialEq, Eq)]
pub enum Flight<T> {
    /// Este caller tomo el lock y ejecuto la accion.
    Completed(T),
    /// Otro caller tiene el lock; la accion no se ejecuto.
    Skipped,
}

impl<T> Flight<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Flight::Skipped)
    }

    /// Retorna el valor si la accion se ejecuto.
    pub fn into_completed(self) -> Option<T> {
        match self {
            Flight::Completed(value) => Some(value),
            Flight::Skipped => None,
        }
    }
}

/// Error de una ejecucion guardada.
#[derive(Debug, Error)]
pub enum FlightError {
    /// No se pudo consultar el lock; la accion no se ejecuto.
    #[error("lock store unavailable for '{lock_key}': {source}")]
    Store {
        lock_key: String,
        source: RemoteError,
    },

    /// La accion excedio el TTL del lock y fue cancelada.
    #[error("action guarded by '{lock_key}' outlived its {ttl:?} lock and was cancelled")]
    Expired { lock_key: String, ttl: Duration },

    /// La accion fallo; el lock ya fue liberado.
    #[error("action guarded by '{lock_key}' failed: {error:#}")]
    Action {
        lock_key: String,
        error: anyhow::Error,
    },
}

/// Garantiza a lo sumo una ejecucion concurrente por lock key en toda la flota.
///
/// Los callers que pierden la carrera reciben [`Flight::Skipped`] de
/// inmediato; no esperan ni reintentan.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tiercache_remote::MemoryStore;
/// use tiercache_server::cache::{Flight, SingleFlightLock};
///
/// # #[tokio::main]
/// # async fn main() {
/// let lock = SingleFlightLock::new(Arc::new(MemoryStore::new()));
///
/// let flight = lock
///     .run("recompute:nodes", Duration::from_secs(6), || async { Ok(42) })
///     .await
///     .unwrap();
///
/// assert_eq!(flight, Flight::Completed(42));
/// # }
/// ```
#[derive(Clone)]
pub struct SingleFlightLock {
    store: Arc<dyn RemoteStore>,
    metrics: CacheMetrics,
}

impl SingleFlightLock {
    /// Crea un lock con metricas propias.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self::with_metrics(store, CacheMetrics::new())
    }

    /// Crea un lock que reporta en las metricas dadas.
    pub fn with_metrics(store: Arc<dyn RemoteStore>, metrics: CacheMetrics) -> Self {
        Self { store, metrics }
    }

    /// Ejecuta `action` si este caller gana el lock.
    ///
    /// La accion corre bajo un timeout igual al TTL. Al terminar, con exito o
    /// error, el lock se libera. Si el timeout vence la accion se cancela y el
    /// lock no se toca, porque ya pudo haberlo tomado otra instancia.
    pub async fn run<T, F, Fut>(
        &self,
        lock_key: &str,
        ttl: Duration,
        action: F,
    ) -> Result<Flight<T>, FlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let acquired = self
            .store
            .set_if_absent(lock_key, LOCK_SENTINEL, ttl)
            .await
            .map_err(|source| {
                self.metrics.record_remote_error("lock");
                FlightError::Store {
                    lock_key: lock_key.to_string(),
                    source,
                }
            })?;

        if !acquired {
            self.metrics.record_lock_skipped();
            debug!(lock_key = %lock_key, "lock held elsewhere, skipping");
            return Ok(Flight::Skipped);
        }

        self.metrics.record_lock_acquired();
        debug!(lock_key = %lock_key, ttl = ?ttl, "lock acquired");

        let outcome = match tokio::time::timeout(ttl, action()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(lock_key = %lock_key, ttl = ?ttl, "guarded action outlived its lock");
                return Err(FlightError::Expired {
                    lock_key: lock_key.to_string(),
                    ttl,
                });
            },
        };

        self.release(lock_key).await;

        outcome
            .map(Flight::Completed)
            .map_err(|error| FlightError::Action {
                lock_key: lock_key.to_string(),
                error,
            })
    }

    async fn release(&self, lock_key: &str) {
        if let Err(e) = self.store.delete(lock_key).await {
            self.metrics.record_remote_error("unlock");
            warn!(lock_key = %lock_key, error = %e, "failed to release lock, it will expire on its own");
        }
    }
}
