//! Server configuration.
//!
//! Values come from built-in defaults, then an optional `tiercache.toml`,
//! then environment variables prefixed with `TIERCACHE_`
//! (e.g. `TIERCACHE_REDIS_URL=redis://cache:6379`).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tiercache_remote::{DEFAULT_TOPIC, RemoteConfig, RemoteError};

use crate::cache::{ListenerConfig, LocalCacheConfig};

const DEFAULT_FILE: &str = "tiercache";

/// Error al cargar la configuracion.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuracion del servidor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Sin URL el servidor corre en modo single-node, en memoria.
    pub redis_url: Option<String>,
    pub key_prefix: Option<String>,
    pub topic: String,
    pub pool_size: usize,
    pub operation_timeout_ms: u64,
    pub local_max_capacity: u64,
    pub sweep_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            redis_url: None,
            key_prefix: None,
            topic: DEFAULT_TOPIC.to_string(),
            pool_size: 16,
            operation_timeout_ms: 2_000,
            local_max_capacity: 10_000,
            sweep_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Carga la configuracion desde `path` (o `tiercache.toml`) y el entorno.
    /// El archivo es opcional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_FILE).required(false),
        };

        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("TIERCACHE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Valida rangos y campos requeridos.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("topic must not be empty".into()));
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "operation_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.local_max_capacity == 0 {
            return Err(ConfigError::Invalid(
                "local_max_capacity must be greater than 0".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Direccion en la que escucha el servidor HTTP.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid listen address: {e}")))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn local_cache(&self) -> LocalCacheConfig {
        LocalCacheConfig {
            max_capacity: self.local_max_capacity,
        }
    }

    pub fn listener(&self) -> ListenerConfig {
        ListenerConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            ..ListenerConfig::default()
        }
    }

    /// Configuracion de Redis, si hay una URL.
    pub fn remote(&self) -> Result<Option<RemoteConfig>, RemoteError> {
        let Some(url) = &self.redis_url else {
            return Ok(None);
        };

        let mut builder = RemoteConfig::builder()
            .url(url)
            .pool_size(self.pool_size)
            .operation_timeout(self.operation_timeout())
            .topic(&self.topic);
        if let Some(prefix) = &self.key_prefix {
            builder = builder.key_prefix(prefix);
        }

        builder.build().map(Some)
    }
}
