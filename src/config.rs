//! Configuration for the bridge
//!
//! All tunables live in [`BridgeConfig`]. Every field has a default and can
//! be overridden from a TOML file (`[section]` tables) and then from
//! `BRIDGE_*` environment variables, which win over the file.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Hard cap on worker count regardless of configuration.
pub const MAX_POOL_WORKERS: usize = 32;

/// Configuration loading/validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid environment variable {var}: {message}")]
    InvalidEnv { var: String, message: String },
}

impl ConfigError {
    fn invalid<S: Into<String>>(field: &str, message: S) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub breaker: BreakerSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub http: HttpSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker endpoint, `tcp://host:port`
    #[serde(default = "default_broker_address")]
    pub address: String,
    /// Connect deadline in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-leg send/receive deadline in milliseconds
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// How long to poll for the connection to become ready
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

/// Worker pool and retry budget settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSection {
    /// Worker count, clamped to [`MAX_POOL_WORKERS`]
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Task queue capacity; defaults to the worker count when absent
    pub queue_capacity: Option<usize>,
    /// Single retry budget for a whole request (exchange attempts)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Exponential backoff base in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Backoff cap in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// Payload limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsSection {
    /// Maximum message size in bytes (default 1 MiB)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

/// Per-client rate limiting settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitSection {
    /// Requests allowed per client within the window
    #[serde(default = "default_rate_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
    /// Upper bound on tracked clients before stale entries are evicted
    #[serde(default = "default_rate_max_clients")]
    pub max_clients: usize,
}

/// HTTP boundary settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSection {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_broker_address() -> String {
    "tcp://0.0.0.0:5555".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    15_000
}
fn default_io_timeout_ms() -> u64 {
    15_000
}
fn default_ready_timeout_ms() -> u64 {
    5_000
}
fn default_workers() -> usize {
    4
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_retry_max_delay_ms() -> u64 {
    30_000
}
fn default_max_message_size() -> usize {
    1024 * 1024
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_reset_timeout_secs() -> u64 {
    30
}
fn default_rate_max_requests() -> usize {
    100
}
fn default_rate_window_secs() -> u64 {
    60
}
fn default_rate_max_clients() -> usize {
    10_000
}
fn default_http_host() -> String {
    "localhost".to_string()
}
fn default_http_port() -> u16 {
    3000
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            address: default_broker_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: default_rate_max_requests(),
            window_secs: default_rate_window_secs(),
            max_clients: default_rate_max_clients(),
        }
    }
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerSection::default(),
            pool: PoolSection::default(),
            limits: LimitsSection::default(),
            breaker: BreakerSection::default(),
            rate_limit: RateLimitSection::default(),
            http: HttpSection::default(),
        }
    }
}

impl BrokerSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Resolve `tcp://host:port` to a connectable `host:port` pair.
    pub fn socket_addr(&self) -> Result<String, ConfigError> {
        let parsed = url::Url::parse(&self.address).map_err(|e| {
            ConfigError::invalid("broker.address", format!("{}: {e}", self.address))
        })?;
        if parsed.scheme() != "tcp" {
            return Err(ConfigError::invalid(
                "broker.address",
                format!("unsupported scheme '{}', expected tcp://", parsed.scheme()),
            ));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::invalid("broker.address", "missing host"))?;
        let port = parsed
            .port()
            .ok_or_else(|| ConfigError::invalid("broker.address", "missing port"))?;
        Ok(format!("{host}:{port}"))
    }
}

impl PoolSection {
    /// Effective worker count after the hard cap.
    pub fn effective_workers(&self) -> usize {
        self.workers.min(MAX_POOL_WORKERS)
    }

    /// Queue capacity, defaulting to the worker count.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or_else(|| self.effective_workers())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

impl BreakerSection {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl RateLimitSection {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl BridgeConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: BridgeConfig = toml::from_str(&content)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides; used when no file is given.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = BridgeConfig::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = read_env("BRIDGE_BROKER_ADDRESS") {
            self.broker.address = v;
        }
        if let Some(v) = read_env("BRIDGE_CONNECT_TIMEOUT_MS") {
            self.broker.connect_timeout_ms = parse_env("BRIDGE_CONNECT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_IO_TIMEOUT_MS") {
            self.broker.io_timeout_ms = parse_env("BRIDGE_IO_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_POOL_WORKERS") {
            self.pool.workers = parse_env("BRIDGE_POOL_WORKERS", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_QUEUE_CAPACITY") {
            self.pool.queue_capacity = Some(parse_env("BRIDGE_QUEUE_CAPACITY", &v)?);
        }
        if let Some(v) = read_env("BRIDGE_MAX_RETRIES") {
            self.pool.max_retries = parse_env("BRIDGE_MAX_RETRIES", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_MAX_MESSAGE_SIZE") {
            self.limits.max_message_size = parse_env("BRIDGE_MAX_MESSAGE_SIZE", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_BREAKER_THRESHOLD") {
            self.breaker.failure_threshold = parse_env("BRIDGE_BREAKER_THRESHOLD", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_BREAKER_RESET_SECS") {
            self.breaker.reset_timeout_secs = parse_env("BRIDGE_BREAKER_RESET_SECS", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_RATE_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_env("BRIDGE_RATE_MAX_REQUESTS", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_RATE_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_env("BRIDGE_RATE_WINDOW_SECS", &v)?;
        }
        if let Some(v) = read_env("BRIDGE_HTTP_HOST") {
            self.http.host = v;
        }
        if let Some(v) = read_env("BRIDGE_HTTP_PORT") {
            self.http.port = parse_env("BRIDGE_HTTP_PORT", &v)?;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.workers == 0 {
            return Err(ConfigError::invalid("pool.workers", "must be at least 1"));
        }
        if self.pool.effective_queue_capacity() == 0 {
            return Err(ConfigError::invalid(
                "pool.queue_capacity",
                "must be at least 1",
            ));
        }
        if self.limits.max_message_size == 0 {
            return Err(ConfigError::invalid(
                "limits.max_message_size",
                "must be at least 1",
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.max_requests",
                "must be at least 1",
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.window_secs",
                "must be at least 1",
            ));
        }
        self.broker.socket_addr()?;
        Ok(())
    }
}

fn read_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| ConfigError::InvalidEnv {
        var: var.to_string(),
        message: format!("{e}"),
    })
}
