//! # Tiercache Remote
//!
//! Shared-state backends for the tiered cache: the remote key-value store
//! every instance reads through, and the pub/sub bus carrying invalidation
//! messages between instances.
//!
//! ## Features
//!
//! - Async trait-based abstractions (`RemoteStore`, `Bus`)
//! - In-memory implementations for tests and single-node mode
//! - Redis implementations with pooled connections and bounded timeouts
//! - Atomic conditional create (`SET NX`) for fleet-wide locks
//!
//! ## Example
//!
//! ```ignore
//! use tiercache_remote::{RedisBus, RedisStore, RemoteConfig};
//!
//! let config = RemoteConfig::builder()
//!     .url("redis://127.0.0.1:6379")
//!     .key_prefix("api:")
//!     .build()?;
//!
//! let store = RedisStore::new(config.clone())?;
//! let bus = RedisBus::new(config)?;
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod store;

// Re-exports
pub use bus::{Bus, MemoryBus, RedisBus, Subscription};
pub use config::{DEFAULT_TOPIC, RemoteConfig, RemoteConfigBuilder};
pub use error::RemoteError;
pub use store::{MemoryStore, RedisStore, RemoteStore};

// Re-export tiercache_core for consumers
pub use tiercache_core;
