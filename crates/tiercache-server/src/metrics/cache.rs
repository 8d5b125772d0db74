//! Cache metrics recording.

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Registra las metricas de cache.
/// Llamar una vez al inicio para registrar las metricas.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "tiercache_cache_hits_total",
        "Total number of cache hits, by tier"
    );
    metrics::describe_counter!("tiercache_cache_misses_total", "Total number of cache misses");
    metrics::describe_counter!(
        "tiercache_remote_errors_total",
        "Remote store or bus failures, by operation"
    );
    metrics::describe_counter!(
        "tiercache_lock_total",
        "Single-flight lock attempts, by outcome"
    );
    metrics::describe_counter!(
        "tiercache_invalidations_published_total",
        "Invalidation messages published to the bus"
    );
    metrics::describe_counter!(
        "tiercache_invalidations_applied_total",
        "Invalidation messages applied to the local cache"
    );
    metrics::describe_counter!(
        "tiercache_coalesced_reads_total",
        "Remote reads joined to an in-flight read of the same key"
    );
    metrics::describe_counter!(
        "tiercache_stale_fills_total",
        "Remote values not copied to the local cache because the key changed"
    );
    metrics::describe_counter!(
        "tiercache_local_resyncs_total",
        "Local cache clears after invalidations may have been missed"
    );
    metrics::describe_counter!(
        "tiercache_local_evictions_total",
        "Local cache evictions, by reason"
    );
    metrics::describe_gauge!(
        "tiercache_local_entries",
        "Current number of entries in the local cache"
    );
    metrics::describe_histogram!(
        "tiercache_operation_seconds",
        "Time spent on cache operations"
    );
}

#[derive(Debug, Default)]
struct Counters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    remote_errors: AtomicU64,
    locks_acquired: AtomicU64,
    locks_skipped: AtomicU64,
    published: AtomicU64,
    applied: AtomicU64,
    ignored: AtomicU64,
    coalesced: AtomicU64,
    stale_fills: AtomicU64,
    resyncs: AtomicU64,
}

/// Recorder de metricas de cache.
/// Usa atomic counters internos para maximo rendimiento; los clones
/// comparten los mismos contadores.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    counters: Arc<Counters>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un hit en la cache local
    pub fn record_local_hit(&self) {
        self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_cache_hits_total", "tier" => "local").increment(1);
    }

    /// Registra un hit en el store remoto
    pub fn record_remote_hit(&self) {
        self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_cache_hits_total", "tier" => "remote").increment(1);
    }

    /// Registra un miss en ambos niveles
    pub fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_cache_misses_total").increment(1);
    }

    /// Registra un fallo remoto
    pub fn record_remote_error(&self, operation: &'static str) {
        self.counters.remote_errors.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_remote_errors_total", "operation" => operation).increment(1);
    }

    /// Registra un lock adquirido
    pub fn record_lock_acquired(&self) {
        self.counters.locks_acquired.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_lock_total", "outcome" => "acquired").increment(1);
    }

    /// Registra un lock ya tomado por otra instancia
    pub fn record_lock_skipped(&self) {
        self.counters.locks_skipped.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_lock_total", "outcome" => "skipped").increment(1);
    }

    pub fn record_published(&self) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_invalidations_published_total").increment(1);
    }

    /// Registra un mensaje aplicado a la cache local
    pub fn record_applied(&self, pattern: &'static str) {
        self.counters.applied.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_invalidations_applied_total", "pattern" => pattern).increment(1);
    }

    /// Registra un mensaje propio ignorado
    pub fn record_ignored(&self) {
        self.counters.ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Registra una lectura remota servida por otra en curso
    pub fn record_coalesced(&self) {
        self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_coalesced_reads_total").increment(1);
    }

    /// Registra un valor remoto descartado porque la key cambio durante la lectura
    pub fn record_stale_fill(&self) {
        self.counters.stale_fills.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_stale_fills_total").increment(1);
    }

    /// Registra un vaciado de la cache local por mensajes perdidos
    pub fn record_resync(&self, reason: &'static str) {
        self.counters.resyncs.fetch_add(1, Ordering::Relaxed);
        counter!("tiercache_local_resyncs_total", "reason" => reason).increment(1);
    }

    /// Registra una eviction
    pub fn record_eviction(&self, reason: &'static str) {
        counter!("tiercache_local_evictions_total", "reason" => reason).increment(1);
    }

    /// Actualiza el gauge de entries
    pub fn update_entry_count(&self, count: u64) {
        gauge!("tiercache_local_entries").set(count as f64);
    }

    /// Registra la duracion de una operacion
    pub fn record_operation_duration(&self, operation: &'static str, duration: Duration) {
        histogram!("tiercache_operation_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Calcula hit rate sobre ambos niveles (para logging/debugging)
    pub fn hit_rate(&self) -> f64 {
        let hits = (self.local_hits() + self.remote_hits()) as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    pub fn local_hits(&self) -> u64 {
        self.counters.local_hits.load(Ordering::Relaxed)
    }

    pub fn remote_hits(&self) -> u64 {
        self.counters.remote_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.counters.misses.load(Ordering::Relaxed)
    }

    pub fn remote_errors(&self) -> u64 {
        self.counters.remote_errors.load(Ordering::Relaxed)
    }

    pub fn locks_acquired(&self) -> u64 {
        self.counters.locks_acquired.load(Ordering::Relaxed)
    }

    pub fn locks_skipped(&self) -> u64 {
        self.counters.locks_skipped.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    pub fn applied(&self) -> u64 {
        self.counters.applied.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.counters.ignored.load(Ordering::Relaxed)
    }

    pub fn coalesced(&self) -> u64 {
        self.counters.coalesced.load(Ordering::Relaxed)
    }

    pub fn stale_fills(&self) -> u64 {
        self.counters.stale_fills.load(Ordering::Relaxed)
    }

    pub fn resyncs(&self) -> u64 {
        self.counters.resyncs.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_metrics_hit_rate() {
        let metrics = CacheMetrics::new();

        // 2 local + 1 remote hits, 1 miss = 75% hit rate
        metrics.record_local_hit();
        metrics.record_local_hit();
        metrics.record_remote_hit();
        metrics.record_miss();

        let rate = metrics.hit_rate();
        assert!((rate - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_hit_rate_without_traffic() {
        assert_eq!(CacheMetrics::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = CacheMetrics::new();
        let clone = metrics.clone();

        clone.record_lock_acquired();
        clone.record_lock_skipped();
        clone.record_lock_skipped();
        metrics.record_applied("deleteCacheKeys");

        assert_eq!(metrics.locks_acquired(), 1);
        assert_eq!(metrics.locks_skipped(), 2);
        assert_eq!(clone.applied(), 1);
    }
}
