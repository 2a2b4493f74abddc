//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MQTT broker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Optional broker credentials
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Capacity of the subscriber -> dispatcher event channel
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "aerosense/readings".to_string()
}

fn default_client_id() -> String {
    format!("aerosense-relay-{}", uuid::Uuid::new_v4())
}

fn default_keep_alive() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            topic: default_topic(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Relay server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token verification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret used to verify bearer tokens issued by the
    /// identity service. MUST match the issuer's signing secret.
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
}

fn default_token_secret() -> String {
    "supersecret".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
        }
    }
}

/// Connection hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Per-connection outbound queue bound; a client that falls this far
    /// behind is disconnected rather than slowing the rest.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

fn default_max_connections() -> usize {
    1000
}

fn default_outbound_queue() -> usize {
    64
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("aerosense").join("config.toml")),
            Some(PathBuf::from("/etc/aerosense/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Broker overrides
        if let Ok(host) = std::env::var("AEROSENSE_BROKER_HOST") {
            self.broker.host = host;
        }
        if let Ok(port) = std::env::var("AEROSENSE_BROKER_PORT") {
            if let Ok(p) = port.parse() {
                self.broker.port = p;
            }
        }
        if let Ok(topic) = std::env::var("AEROSENSE_TOPIC") {
            self.broker.topic = topic;
        }
        if let Ok(username) = std::env::var("AEROSENSE_BROKER_USERNAME") {
            self.broker.username = Some(username);
        }
        if let Ok(password) = std::env::var("AEROSENSE_BROKER_PASSWORD") {
            self.broker.password = Some(password);
        }

        // Server overrides
        if let Ok(host) = std::env::var("AEROSENSE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("AEROSENSE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        // Auth overrides
        if let Ok(secret) = std::env::var("AEROSENSE_TOKEN_SECRET") {
            self.auth.token_secret = secret;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("AEROSENSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("AEROSENSE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            hub: HubSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Aerosense Relay Configuration
#
# Environment variables override these settings:
# - AEROSENSE_BROKER_HOST
# - AEROSENSE_BROKER_PORT
# - AEROSENSE_TOPIC
# - AEROSENSE_HOST
# - AEROSENSE_PORT
# - AEROSENSE_TOKEN_SECRET
# - AEROSENSE_LOG_LEVEL
# - AEROSENSE_LOG_FORMAT

[broker]
# MQTT broker address
host = "localhost"
port = 1883

# Topic carrying device readings
topic = "aerosense/readings"

# Keep-alive interval (seconds)
keep_alive_secs = 30

# Subscriber -> dispatcher channel capacity
queue_capacity = 256

[server]
# Relay server bind address
host = "0.0.0.0"
port = 8080

[auth]
# Shared token verification secret - MUST match the identity service
token_secret = "supersecret"

[hub]
# Maximum concurrent WebSocket connections
max_connections = 1000

# Per-connection outbound queue bound
outbound_queue = 64

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
