//! Tiered cache for Tiercache Server.
//!
//! This module provides the process-local tier (Moka), the coordinator that
//! reads and writes through the shared remote tier, the fleet-wide
//! single-flight lock, the bus listener that keeps local tiers coherent, and
//! the scheduled warmer.

pub mod coordinator;
pub mod listener;
pub mod local;
pub mod lock;
pub mod warmer;

// Re-exports
pub use coordinator::{CacheCoordinator, CoordinatorError};
pub use listener::{
    InvalidationListener, ListenerConfig, ListenerHandle, ListenerState, ListenerStatus,
};
pub use local::{Generation, LocalCache, LocalCacheConfig};
pub use lock::{Flight, FlightError, SingleFlightLock};
pub use warmer::{CacheWarmer, Producer, WarmJob, WarmerConfig, WarmerHandle};
