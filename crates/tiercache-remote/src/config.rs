//! Remote backend configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Default pub/sub topic for invalidation messages.
pub const DEFAULT_TOPIC: &str = "cache:invalidate";

/// Configuration for the Redis store and bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Redis connection URL.
    url: String,

    /// Prefix prepended to every key written to the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_prefix: Option<String>,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_size")]
    pool_size: usize,

    /// Deadline for a single store or bus call.
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    operation_timeout: Duration,

    /// Pub/sub topic carrying invalidation messages.
    #[serde(default = "default_topic")]
    topic: String,
}

fn default_pool_size() -> usize {
    16
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

impl RemoteConfig {
    /// Creates a new builder for RemoteConfig.
    pub fn builder() -> RemoteConfigBuilder {
        RemoteConfigBuilder::default()
    }

    /// Returns the Redis URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the key prefix, if any.
    pub fn key_prefix(&self) -> Option<&str> {
        self.key_prefix.as_deref()
    }

    /// Returns the maximum pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the per-operation timeout.
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Returns the invalidation topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Applies the key prefix to a key.
    pub fn prefixed(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }
}

/// Builder for RemoteConfig.
#[derive(Debug, Default)]
pub struct RemoteConfigBuilder {
    url: Option<String>,
    key_prefix: Option<String>,
    pool_size: Option<usize>,
    operation_timeout: Option<Duration>,
    topic: Option<String>,
}

impl RemoteConfigBuilder {
    /// Sets the Redis URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Sets the maximum pool size.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Sets the per-operation timeout.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Sets the invalidation topic.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or a numeric setting is zero.
    pub fn build(self) -> Result<RemoteConfig, RemoteError> {
        let url = self
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| RemoteError::InvalidConfig("url is required".into()))?;

        let pool_size = self.pool_size.unwrap_or_else(default_pool_size);
        if pool_size == 0 {
            return Err(RemoteError::InvalidConfig(
                "pool size must be positive".into(),
            ));
        }

        let operation_timeout = self
            .operation_timeout
            .unwrap_or_else(default_operation_timeout);
        if operation_timeout.is_zero() {
            return Err(RemoteError::InvalidConfig(
                "operation timeout must be positive".into(),
            ));
        }

        Ok(RemoteConfig {
            url,
            key_prefix: self.key_prefix.filter(|prefix| !prefix.is_empty()),
            pool_size,
            operation_timeout,
            topic: self.topic.unwrap_or_else(default_topic),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = RemoteConfig::builder()
            .url("redis://127.0.0.1:6379")
            .build()
            .unwrap();

        assert_eq!(config.url(), "redis://127.0.0.1:6379");
        assert_eq!(config.pool_size(), 16);
        assert_eq!(config.operation_timeout(), Duration::from_secs(2));
        assert_eq!(config.topic(), DEFAULT_TOPIC);
        assert!(config.key_prefix().is_none());
    }

    #[test]
    fn test_builder_requires_url() {
        let result = RemoteConfig::builder().pool_size(4).build();
        assert!(matches!(result, Err(RemoteError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_zero_values() {
        let result = RemoteConfig::builder()
            .url("redis://localhost")
            .pool_size(0)
            .build();
        assert!(result.is_err());

        let result = RemoteConfig::builder()
            .url("redis://localhost")
            .operation_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_prefixed_keys() {
        let config = RemoteConfig::builder()
            .url("redis://localhost")
            .key_prefix("api:")
            .build()
            .unwrap();
        assert_eq!(config.prefixed("nodes"), "api:nodes");

        let config = RemoteConfig::builder()
            .url("redis://localhost")
            .key_prefix("")
            .build()
            .unwrap();
        assert_eq!(config.prefixed("nodes"), "nodes");
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let config: RemoteConfig = serde_json::from_str(
            r#"{"url": "redis://cache:6379", "operationTimeout": "500ms", "topic": "events"}"#,
        )
        .unwrap();

        assert_eq!(config.operation_timeout(), Duration::from_millis(500));
        assert_eq!(config.topic(), "events");
        assert_eq!(config.pool_size(), 16);
    }
}
