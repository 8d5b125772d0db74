//! # Tiercache Server
//!
//! Tiered cache for a fleet of API instances: a process-local tier in front
//! of a shared remote store, kept coherent through invalidation messages on
//! a pub/sub bus, plus a fleet-wide single-flight lock for expensive
//! recomputation.
//!
//! The binary exposes only `/health` and `/metrics`; cache control travels
//! exclusively over the bus.

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod state;

// Re-exports
pub use cache::{
    CacheCoordinator, CacheWarmer, CoordinatorError, Flight, FlightError, InvalidationListener,
    LocalCache, SingleFlightLock,
};
pub use config::AppConfig;
pub use handlers::HealthResponse;
pub use server::{create_router, run_server};
pub use state::AppState;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
