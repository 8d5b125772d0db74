//! Invalidation messages exchanged over the bus.
//!
//! Messages only ever delete a key or extend its TTL; they never carry a
//! value. Receivers can therefore apply them in any order and any number
//! of times without caching stale data.
//!
//! # Wire format
//!
//! ```json
//! {"origin":"0190...","message":{"pattern":"deleteCacheKeys","data":["nodes"]}}
//! {"origin":null,"message":{"pattern":"refreshCacheKey","data":{"key":"nodes","ttl":3600}}}
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// A cache coherence instruction for every instance's local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pattern", content = "data")]
pub enum InvalidationMessage {
    /// Drop the given keys from the local cache.
    #[serde(rename = "deleteCacheKeys")]
    DeleteKeys(Vec<String>),

    /// Extend the local TTL of a key without touching its value.
    #[serde(rename = "refreshCacheKey")]
    RefreshKey {
        key: String,
        #[serde(rename = "ttl")]
        ttl_seconds: u64,
    },
}

impl InvalidationMessage {
    /// Builds a `DeleteKeys` message.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyKeys`] if `keys` is empty.
    pub fn delete_keys<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(CoreError::EmptyKeys);
        }
        Ok(Self::DeleteKeys(keys))
    }

    /// Builds a `RefreshKey` message.
    pub fn refresh_key(key: impl Into<String>, ttl_seconds: u64) -> Self {
        Self::RefreshKey {
            key: key.into(),
            ttl_seconds,
        }
    }

    /// Returns the keys this message touches.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::DeleteKeys(keys) => keys.iter().map(String::as_str).collect(),
            Self::RefreshKey { key, .. } => vec![key.as_str()],
        }
    }

    /// Returns the event pattern used on the wire.
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::DeleteKeys(_) => "deleteCacheKeys",
            Self::RefreshKey { .. } => "refreshCacheKey",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::DeleteKeys(keys) if keys.is_empty() => Err(CoreError::EmptyKeys),
            _ => Ok(()),
        }
    }
}

/// A message plus the instance that published it.
///
/// `origin` es `None` para mensajes inyectados por operadores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEnvelope {
    #[serde(default)]
    pub origin: Option<Uuid>,
    pub message: InvalidationMessage,
}

impl BusEnvelope {
    /// Wraps a message published by the given instance.
    pub fn from_instance(origin: Uuid, message: InvalidationMessage) -> Self {
        Self {
            origin: Some(origin),
            message,
        }
    }

    /// Wraps a message with no originating instance.
    pub fn anonymous(message: InvalidationMessage) -> Self {
        Self {
            origin: None,
            message,
        }
    }

    /// Returns true if this envelope was published by `instance`.
    pub fn is_from(&self, instance: Uuid) -> bool {
        self.origin == Some(instance)
    }

    /// Serializes the envelope to its JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates an envelope from its JSON wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        envelope.message.validate()?;
        Ok(envelope)
    }
}
