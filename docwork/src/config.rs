//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: DOCWORK_, `__` separates nested keys)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/docwork/{service_name}/config.toml
//! 4. System directory: /etc/docwork/{service_name}/config.toml
//! 5. Default values
//!
//! ```toml
//! [service]
//! name = "inventory"
//! log_level = "debug"
//!
//! [mongodb]
//! host = "db.internal"
//! database = "inventory"
//! username = "app"
//! password = "secret"
//! replica_set = "rs0"
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{sanitize_url, Result};
use crate::repository::RepositoryError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// MongoDB connection configuration
    #[serde(default)]
    pub mongodb: MongoConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "docwork".to_string(),
            log_level: default_log_level(),
            environment: default_environment(),
        }
    }
}

/// MongoDB connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Server host name
    pub host: String,

    /// Server port (1-65535)
    pub port: u32,

    /// Database name
    pub database: String,

    /// Username; credentials are only rendered when both username and password are set
    pub username: String,

    /// Password
    pub password: String,

    /// Authentication database, only rendered alongside a username
    pub auth_source: String,

    /// Enable TLS
    pub ssl: bool,

    /// Replica set name
    pub replica_set: String,

    /// Maximum pool size (0 leaves the driver default)
    pub max_pool_size: u32,

    /// Minimum pool size (0 leaves the driver default)
    pub min_pool_size: u32,

    /// Maximum idle time for pooled connections in seconds
    pub max_idle_time_secs: u64,

    /// Connect, server selection and per-operation timeout in seconds (0 disables)
    pub timeout_secs: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
            database: "test".to_string(),
            username: String::new(),
            password: String::new(),
            auth_source: "admin".to_string(),
            ssl: false,
            replica_set: String::new(),
            max_pool_size: default_max_pool_size(),
            min_pool_size: default_min_pool_size(),
            max_idle_time_secs: default_max_idle_time(),
            timeout_secs: default_timeout(),
        }
    }
}

impl MongoConfig {
    /// Check the settings a connection cannot work without
    ///
    /// ```rust
    /// use docwork::config::MongoConfig;
    ///
    /// let config = MongoConfig { host: String::new(), ..Default::default() };
    /// assert_eq!(config.validate().unwrap_err().message, "host cannot be empty");
    /// ```
    pub fn validate(&self) -> std::result::Result<(), RepositoryError> {
        if self.host.is_empty() {
            return Err(RepositoryError::config_invalid("host cannot be empty"));
        }
        if self.port == 0 || self.port > 65535 {
            return Err(RepositoryError::config_invalid(
                "port must be between 1 and 65535",
            ));
        }
        if self.database.is_empty() {
            return Err(RepositoryError::config_invalid(
                "database name cannot be empty",
            ));
        }
        Ok(())
    }

    /// Render the connection URI
    ///
    /// ```rust
    /// use docwork::config::MongoConfig;
    ///
    /// assert_eq!(
    ///     MongoConfig::default().connection_string(),
    ///     "mongodb://localhost:27017/test?maxPoolSize=100&minPoolSize=5"
    /// );
    /// ```
    pub fn connection_string(&self) -> String {
        let mut uri = String::from("mongodb://");

        if !self.username.is_empty() && !self.password.is_empty() {
            uri.push_str(&format!("{}:{}@", self.username, self.password));
        }

        uri.push_str(&format!("{}:{}/{}", self.host, self.port, self.database));

        let mut params = Vec::new();
        if !self.auth_source.is_empty() && !self.username.is_empty() {
            params.push(format!("authSource={}", self.auth_source));
        }
        if self.max_pool_size > 0 {
            params.push(format!("maxPoolSize={}", self.max_pool_size));
        }
        if self.min_pool_size > 0 {
            params.push(format!("minPoolSize={}", self.min_pool_size));
        }
        if self.ssl {
            params.push("ssl=true".to_string());
        }
        if !self.replica_set.is_empty() {
            params.push(format!("replicaSet={}", self.replica_set));
        }

        if !params.is_empty() {
            uri.push('?');
            uri.push_str(&params.join("&"));
        }

        uri
    }

    /// Connection URI with credentials redacted, safe for logs
    pub fn sanitized_connection_string(&self) -> String {
        sanitize_url(&self.connection_string())
    }

    /// Per-operation timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Pool idle timeout, `None` when disabled
    pub fn max_idle_time(&self) -> Option<Duration> {
        (self.max_idle_time_secs > 0).then(|| Duration::from_secs(self.max_idle_time_secs))
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_max_pool_size() -> u32 {
    100
}

fn default_min_pool_size() -> u32 {
    5
}

fn default_max_idle_time() -> u64 {
    30
}

fn default_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "docwork".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let defaults = Config {
            service: ServiceConfig {
                name: service_name.to_string(),
                ..ServiceConfig::default()
            },
            ..Config::default()
        };
        let mut figment = Figment::new().merge(Serialized::defaults(defaults));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("DOCWORK_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the XDG and system directories. A missing file leaves the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DOCWORK_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service
    ///
    /// Returns paths in priority order (highest first).
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("docwork");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/docwork")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Check the loaded configuration before use
    pub fn validate(&self) -> Result<()> {
        self.mongodb
            .validate()
            .map_err(|e| crate::error::Error::InvalidConfig(e.message))
    }
}
