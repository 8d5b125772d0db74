//! Error types for remote stores and buses.

use std::time::Duration;

use tiercache_core::CoreError;

/// Errors that can occur when talking to the shared store or the bus.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The backend could not be reached.
    #[error("remote unavailable: {reason}")]
    Unavailable { reason: String },

    /// A remote call did not complete within its deadline.
    #[error("remote operation '{operation}' timed out after {millis}ms")]
    Timeout { operation: &'static str, millis: u64 },

    /// The backend rejected or failed a command.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A bus payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// The subscription was closed by the backend.
    #[error("subscription to '{topic}' closed")]
    SubscriptionClosed { topic: String },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RemoteError {
    /// Creates a new unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a timeout error for the given operation.
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout {
            operation,
            millis: after.as_millis() as u64,
        }
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::Timeout { .. } | Self::SubscriptionClosed { .. } => {
                true
            },
            Self::Redis(err) => err.is_io_error() || err.is_timeout() || err.is_connection_dropped(),
            Self::Codec(_) | Self::InvalidConfig(_) => false,
        }
    }
}

impl From<deadpool_redis::PoolError> for RemoteError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::unavailable(format!("failed to get redis connection: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RemoteError::unavailable("connection refused");
        assert_eq!(err.to_string(), "remote unavailable: connection refused");

        let err = RemoteError::timeout("get", Duration::from_millis(250));
        assert_eq!(
            err.to_string(),
            "remote operation 'get' timed out after 250ms"
        );

        let err = RemoteError::SubscriptionClosed {
            topic: "cache:invalidate".into(),
        };
        assert_eq!(err.to_string(), "subscription to 'cache:invalidate' closed");
    }

    #[test]
    fn test_is_transient() {
        assert!(RemoteError::unavailable("network error").is_transient());
        assert!(RemoteError::timeout("set", Duration::from_secs(2)).is_transient());
        assert!(!RemoteError::InvalidConfig("missing url".into()).is_transient());
        assert!(!RemoteError::Codec(CoreError::EmptyKeys).is_transient());
    }
}
