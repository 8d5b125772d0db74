//! Metrics setup and initialization.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

use super::register_cache_metrics;

/// Buckets para histogramas (en segundos).
/// Lecturas locales en microsegundos, remotas en milisegundos.
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, // 10 microsegundos
    0.0001,  // 100 microsegundos
    0.0005,  // 500 microsegundos
    0.001,   // 1 milisegundo
    0.0025,  // 2.5 milisegundos
    0.005,   // 5 milisegundos
    0.01,    // 10 milisegundos
    0.025,   // 25 milisegundos
    0.05,    // 50 milisegundos
    0.1,     // 100 milisegundos
    0.25,    // 250 milisegundos
    0.5,     // 500 milisegundos
    1.0,     // 1 segundo
    2.5,     // 2.5 segundos
];

/// Inicializa el sistema de metricas y retorna el handle para el endpoint.
///
/// Falla si ya hay un recorder global instalado.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(LATENCY_BUCKETS)?
        .install_recorder()?;

    register_cache_metrics();

    info!("Metrics system initialized");
    Ok(handle)
}

/// Crea un handle sin instalar el recorder global (para tests).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
