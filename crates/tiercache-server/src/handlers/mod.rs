//! HTTP handlers.

pub mod health;
pub mod metrics;

pub use health::{HealthResponse, RemoteHealth, health_check, not_found};
pub use metrics::metrics_handler;
