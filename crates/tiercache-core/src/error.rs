//! Error types for Tiercache Core.
//!
//! Only data-shape problems live here: malformed bus payloads and key
//! strings that do not belong to any known resource. I/O failures are
//! reported by the remote crate.

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced while building or decoding core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A `deleteCacheKeys` message carried no keys.
    #[error("deleteCacheKeys message must carry at least one key")]
    EmptyKeys,

    /// The key string does not map to any registered resource.
    #[error("unknown cache resource '{0}'")]
    UnknownResource(String),

    /// The payload is not a valid bus envelope.
    #[error("invalid bus payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates an unknown resource error.
    pub fn unknown_resource(name: impl Into<String>) -> Self {
        Self::UnknownResource(name.into())
    }
}
