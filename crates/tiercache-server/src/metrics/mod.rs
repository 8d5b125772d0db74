//! Metrics module for Tiercache Server.

pub mod cache;
pub mod setup;

pub use cache::{CacheMetrics, register_cache_metrics};
pub use setup::init_metrics;
