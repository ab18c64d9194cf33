use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::registry::{AuthMethod, Protocol, RegistryEndpoint};

// =============================================================================
// Time-related constants
// =============================================================================

/// Default lifetime of a cached result in milliseconds (1 hour)
pub const DEFAULT_CACHE_EXPIRATION_MS: u64 = 60 * 60 * 1000;

/// Upper bound for the cache expiration in milliseconds (one year)
pub const MAX_CACHE_EXPIRATION_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Timeout for registry requests in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// HTTP defaults
// =============================================================================

pub const DEFAULT_HTTP_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_METRICS_NAMESPACE: &str = "imagewatch";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cache.expiration must be greater than zero")]
    ZeroExpiration,

    #[error("cache.expiration must not exceed {max} milliseconds")]
    ExpirationTooLong { max: u64 },

    #[error("Registry '{name}' has no address")]
    EmptyRegistryAddress { name: String },

    #[error("Invalid listen address '{address}'")]
    InvalidListenAddress { address: String },

    #[error("Invalid metrics path '{path}': must start with '/' and not be '/discover'")]
    InvalidMetricsPath { path: String },

    #[error("Invalid metrics namespace '{namespace}'")]
    InvalidNamespace { namespace: String },
}

/// Exporter configuration file structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub cache: CacheConfig,
    pub discovery: DiscoveryConfig,
    /// Named registries, in the order they were configured
    pub registries: IndexMap<String, RegistryConfig>,
    pub http: HttpConfig,
    pub prometheus: PrometheusConfig,
    pub log: LogConfig,
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// How long a resolved result is reused, in milliseconds
    pub expiration: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration: DEFAULT_CACHE_EXPIRATION_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Directory holding one JSON file per discovery input
    pub directory: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            directory: discovery_dir(),
        }
    }
}

/// Individual registry configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub address: String,
    pub auth: AuthMethod,
    pub basic_username: String,
    pub basic_password: String,
    pub protocol: Protocol,
}

impl RegistryConfig {
    pub fn to_endpoint(&self) -> RegistryEndpoint {
        let endpoint = RegistryEndpoint::new(self.address.clone(), self.protocol);
        match self.auth {
            AuthMethod::None => endpoint,
            AuthMethod::Basic => endpoint.with_basic_auth(&self.basic_username, &self.basic_password),
            AuthMethod::Token => endpoint.with_token_auth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpConfig {
    /// Socket address the HTTP server binds to
    pub address: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_HTTP_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PrometheusConfig {
    pub path: String,
    pub namespace: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_METRICS_PATH.to_string(),
            namespace: DEFAULT_METRICS_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.expiration == 0 {
            return Err(ConfigError::ZeroExpiration);
        }
        if self.cache.expiration > MAX_CACHE_EXPIRATION_MS {
            return Err(ConfigError::ExpirationTooLong {
                max: MAX_CACHE_EXPIRATION_MS,
            });
        }

        if let Some((name, _)) = self
            .registries
            .iter()
            .find(|(_, registry)| registry.address.is_empty())
        {
            return Err(ConfigError::EmptyRegistryAddress { name: name.clone() });
        }

        self.listen_address()?;

        let path = &self.prometheus.path;
        if !path.starts_with('/') || path == "/discover" {
            return Err(ConfigError::InvalidMetricsPath { path: path.clone() });
        }

        if !is_valid_namespace(&self.prometheus.namespace) {
            return Err(ConfigError::InvalidNamespace {
                namespace: self.prometheus.namespace.clone(),
            });
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.expiration)
    }

    pub fn listen_address(&self) -> Result<SocketAddr, ConfigError> {
        self.http
            .address
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress {
                address: self.http.address.clone(),
            })
    }

    /// Configured registries as endpoints, in configuration order
    pub fn endpoints(&self) -> Vec<RegistryEndpoint> {
        self.registries.values().map(RegistryConfig::to_endpoint).collect()
    }
}

/// Metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Returns the path to the data directory for imagewatch.
/// Uses $XDG_DATA_HOME/imagewatch if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/imagewatch,
/// or ./imagewatch if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the default discovery directory.
pub fn discovery_dir() -> PathBuf {
    data_dir().join("discovery")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("imagewatch")
}
