use axum::{Json, extract::State, http::StatusCode, http::Uri};
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::cache::ListenerState;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RemoteHealth {
    pub backend: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub instance_id: Uuid,
    pub listener: ListenerState,
    pub remote: RemoteHealth,
    pub bus: String,
    pub local_entries: u64,
    pub hit_rate: f64,
}

impl HealthResponse {
    pub fn is_up(&self) -> bool {
        self.status == "UP"
    }
}

/// Reporta el estado del listener, del store remoto y de la cache local.
///
/// Sin listener la cache local puede servir datos viejos, asi que responde
/// 503. Una caida del store remoto solo baja el hit rate: reporta
/// `DEGRADED` con 200 para que la instancia siga recibiendo trafico.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let coordinator = state.coordinator();
    let remote = coordinator.remote();

    let remote_error = match remote.health_check().await {
        Ok(()) => None,
        Err(e) => {
            warn!(error = %e, "remote store health check failed");
            Some(e.to_string())
        },
    };

    let listener = state.listener().get();
    let subscribed = listener == ListenerState::Subscribed;
    let healthy = subscribed && remote_error.is_none();

    let response = HealthResponse {
        status: if healthy { "UP" } else { "DEGRADED" }.to_string(),
        instance_id: coordinator.instance_id(),
        listener,
        remote: RemoteHealth {
            backend: remote.name().to_string(),
            healthy: remote_error.is_none(),
            error: remote_error,
        },
        bus: coordinator.bus().name().to_string(),
        local_entries: coordinator.local().entry_count(),
        hit_rate: coordinator.metrics().hit_rate(),
    };

    let status = if subscribed {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Fallback para rutas desconocidas.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
