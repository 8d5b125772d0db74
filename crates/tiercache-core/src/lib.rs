//! Tiercache Core - Key policies and invalidation messages
//!
//! This crate provides the foundational types shared by every tier of the
//! cache: the static mapping from logical resources to cache keys and TTLs,
//! and the messages instances exchange to keep their local caches coherent.
//!
//! # Example
//!
//! ```
//! use tiercache_core::{KeyPolicyRegistry, Resource};
//!
//! let spec = KeyPolicyRegistry::resolve("nodes");
//! assert_eq!(spec.name(), "nodes");
//! assert_eq!(spec.ttl_seconds(), 3600);
//!
//! let spec = Resource::TxCount("erd1abc".into()).spec();
//! assert_eq!(spec.name(), "txCount:erd1abc");
//! ```

pub mod error;
pub mod keys;
pub mod message;

pub use error::{CoreError, Result};
pub use keys::{CacheKeySpec, KeyPolicyRegistry, Resource};
pub use message::{BusEnvelope, InvalidationMessage};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
