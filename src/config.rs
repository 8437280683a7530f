//! Configuration management for Tollgate.
//!
//! Values are layered: built-in defaults, an optional YAML file, then
//! `TOLLGATE__SECTION__KEY` environment variables. The binary applies its CLI
//! flags on top of the result.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{
    ConsistencyMode, FailurePolicy, DEFAULT_LIMIT, DEFAULT_NAMESPACE, DEFAULT_WINDOW,
};

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Client identity resolution
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Upper bound on each store call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts for the read step when the store is unreachable
    #[serde(default)]
    pub read_retries: u32,
}

impl StoreConfig {
    /// Get the per-call timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            timeout_ms: default_timeout_ms(),
            read_retries: 0,
        }
    }
}

fn default_store_url() -> String {
    "redis://redis:6379/0".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum admitted requests per window
    #[serde(default = "default_request_limit")]
    pub request_limit: u64,

    /// Window length in seconds
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,

    /// Prefix of every counter key
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Store interaction mode
    #[serde(default)]
    pub consistency: ConsistencyMode,

    /// Outcome when the store fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl RateLimitingConfig {
    /// Get the window as a Duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.time_window_secs)
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            request_limit: default_request_limit(),
            time_window_secs: default_time_window(),
            namespace: default_namespace(),
            consistency: ConsistencyMode::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_request_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_time_window() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Client identity resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Prefer `X-Forwarded-For` / `X-Real-IP` over the peer address
    #[serde(default)]
    pub trust_forwarded_headers: bool,

    /// Identity used when no client address is known
    #[serde(default = "default_fallback_identity")]
    pub fallback: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_headers: false,
            fallback: default_fallback_identity(),
        }
    }
}

fn default_fallback_identity() -> String {
    "unknown".to_string()
}

impl TollgateConfig {
    /// Load configuration from an optional file plus `TOLLGATE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("TOLLGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TollgateError::Config(e.to_string()))
    }

    /// Check semantic constraints the types cannot express.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.request_limit == 0 {
            return Err(TollgateError::Config(
                "request_limit must be positive".to_string(),
            ));
        }
        if rl.time_window_secs == 0 {
            return Err(TollgateError::Config(
                "time_window_secs must be positive".to_string(),
            ));
        }
        if rl.namespace.is_empty() {
            return Err(TollgateError::Config("namespace must not be empty".to_string()));
        }
        if self.store.timeout_ms == 0 {
            return Err(TollgateError::Config("store timeout must be positive".to_string()));
        }
        if !self.store.url.starts_with("redis://") && !self.store.url.starts_with("rediss://") {
            return Err(TollgateError::Config(format!(
                "store url must use redis:// or rediss://, got {}",
                self.store.url
            )));
        }
        if self.identity.fallback.trim().is_empty() {
            return Err(TollgateError::Config(
                "fallback identity must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
