//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use log::{info, warn};

use crate::client::retry::RetryPolicy;
use crate::client::ClientOptions;
use crate::error::{Result, StoreError};
use crate::hash::DEFAULT_BLOCK_SIZE;
use crate::routing::RoutingMode;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "SURFSTORE_CONFIG";

/// Configuration file used when the environment variable is unset
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Metadata service endpoint
    pub metadata: Endpoint,
    /// Block service endpoints; position is the shard index
    pub block_stores: Vec<Endpoint>,
    /// Client behaviour
    pub client: ClientConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// A `host:port` pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Block placement policy as written in the config file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoutingKind {
    #[default]
    Hash,
    Affinity,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Block size in bytes
    pub block_size: usize,
    /// Placement policy
    pub routing: RoutingKind,
    /// Shard pinned for the session when `routing` is `affinity`
    pub affinity_shard: Option<usize>,
    /// Commit/delete retry behaviour
    pub retry: RetryConfig,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Give up after this many attempts; absent means never
    pub max_attempts: Option<u32>,
    /// Initial wait after a version conflict, in milliseconds
    pub backoff_ms: u64,
    /// Cap on the doubled wait, in milliseconds
    pub max_backoff_ms: u64,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Maximum request payload in bytes
    pub max_payload_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log configuration file
    pub config_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            metadata: Endpoint::new("127.0.0.1", 6000),
            block_stores: vec![Endpoint::new("127.0.0.1", 7000)],
            client: ClientConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            routing: RoutingKind::Hash,
            affinity_shard: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(64),
            backoff_ms: 10,
            max_backoff_ms: 1000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_payload_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `$SURFSTORE_CONFIG` or `config.yaml`, using defaults if not found
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load configuration from `path`, using defaults if it does not exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            let config = Self::from_yaml(&content)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Reject settings the protocol cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.block_stores.is_empty() {
            return Err(StoreError::Config("at least one block store is required".to_string()));
        }
        if self.client.block_size == 0 {
            return Err(StoreError::Config("client.block_size must be non-zero".to_string()));
        }
        match (self.client.routing, self.client.affinity_shard) {
            (RoutingKind::Affinity, None) => {
                return Err(StoreError::Config("affinity routing needs client.affinity_shard".to_string()));
            }
            (_, Some(index)) if index >= self.block_stores.len() => {
                return Err(StoreError::InvalidShard { index, shard_count: self.block_stores.len() });
            }
            _ => {}
        }
        Ok(())
    }

    /// Placement policy for client sessions
    pub fn routing_mode(&self) -> RoutingMode {
        match (self.client.routing, self.client.affinity_shard) {
            (RoutingKind::Affinity, Some(index)) => RoutingMode::Affinity(index),
            _ => RoutingMode::Hash,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.client.retry;
        RetryPolicy {
            max_attempts: retry.max_attempts,
            backoff: Duration::from_millis(retry.backoff_ms),
            max_backoff: Duration::from_millis(retry.max_backoff_ms),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            block_size: self.client.block_size,
            routing: self.routing_mode(),
            retry: self.retry_policy(),
        }
    }
}
