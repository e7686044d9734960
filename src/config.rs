//! # Configuration Management
//!
//! Centralized configuration for servers and clients built on this crate.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Zero Values
//! Zero keeps its "use the default" meaning everywhere it is accepted: a zero timeout
//! disables the deadline, a zero queue size or write-attempt count falls back to the
//! crate defaults, and zero socket buffer sizes leave the OS defaults untouched.

use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default capacity of the router's shared request queue
pub const DEFAULT_REQ_QUEUE_SIZE: usize = 1024;

/// Default capacity of each session's response queue
pub const DEFAULT_RESP_QUEUE_SIZE: usize = 1024;

/// Default number of attempts for writing one packet
pub const DEFAULT_WRITE_ATTEMPTS: usize = 1;

/// Max allowed payload size accepted by the default packer (1 MiB)
pub const MAX_DATA_SIZE: usize = 1024 * 1024;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Socket and framing configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("TCP_ROUTER_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(size) = std::env::var("TCP_ROUTER_REQ_QUEUE_SIZE") {
            config.server.req_queue_size = parse_env("TCP_ROUTER_REQ_QUEUE_SIZE", &size)?;
        }

        if let Ok(size) = std::env::var("TCP_ROUTER_RESP_QUEUE_SIZE") {
            config.server.resp_queue_size = parse_env("TCP_ROUTER_RESP_QUEUE_SIZE", &size)?;
        }

        if let Ok(ms) = std::env::var("TCP_ROUTER_READ_TIMEOUT_MS") {
            config.server.read_timeout =
                Duration::from_millis(parse_env("TCP_ROUTER_READ_TIMEOUT_MS", &ms)?);
        }

        if let Ok(ms) = std::env::var("TCP_ROUTER_WRITE_TIMEOUT_MS") {
            config.server.write_timeout =
                Duration::from_millis(parse_env("TCP_ROUTER_WRITE_TIMEOUT_MS", &ms)?);
        }

        if let Ok(size) = std::env::var("TCP_ROUTER_MAX_DATA_SIZE") {
            config.transport.max_data_size = parse_env("TCP_ROUTER_MAX_DATA_SIZE", &size)?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {name}: '{value}'")))
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server listen address (e.g., "127.0.0.1:5896")
    pub address: String,

    /// Per-attempt deadline for reading one packet; zero disables it
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Per-attempt deadline for writing one packet; zero disables it
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,

    /// Capacity of the router's shared request queue (0 = default)
    pub req_queue_size: usize,

    /// Capacity of each session's response queue (0 = default)
    pub resp_queue_size: usize,

    /// Attempts made for writing one packet before the session is closed (0 = default)
    pub write_attempts: usize,

    /// Log the route table when serving starts
    pub print_routes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:5896"),
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            req_queue_size: DEFAULT_REQ_QUEUE_SIZE,
            resp_queue_size: DEFAULT_RESP_QUEUE_SIZE,
            write_attempts: DEFAULT_WRITE_ATTEMPTS,
            print_routes: true,
        }
    }
}

impl ServerConfig {
    /// Request queue capacity with the zero fallback applied
    pub fn effective_req_queue_size(&self) -> usize {
        if self.req_queue_size == 0 {
            DEFAULT_REQ_QUEUE_SIZE
        } else {
            self.req_queue_size
        }
    }

    /// Response queue capacity with the zero fallback applied
    pub fn effective_resp_queue_size(&self) -> usize {
        if self.resp_queue_size == 0 {
            DEFAULT_RESP_QUEUE_SIZE
        } else {
            self.resp_queue_size
        }
    }

    /// Write attempt count with the zero fallback applied
    pub fn effective_write_attempts(&self) -> usize {
        if self.write_attempts == 0 {
            DEFAULT_WRITE_ATTEMPTS
        } else {
            self.write_attempts
        }
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:5896')",
                self.address
            ));
        }

        if self.req_queue_size > 1_000_000 {
            errors.push(format!(
                "Request queue size too large: {} (max recommended: 1,000,000)",
                self.req_queue_size
            ));
        }

        if self.resp_queue_size > 1_000_000 {
            errors.push(format!(
                "Response queue size too large: {} (max recommended: 1,000,000)",
                self.resp_queue_size
            ));
        }

        if self.write_attempts > 100 {
            errors.push(format!(
                "Write attempts too high: {} (maximum: 100)",
                self.write_attempts
            ));
        }

        if self.write_attempts > 1 && self.write_timeout.is_zero() {
            errors.push(
                "Write attempts above 1 have no effect without a write timeout".to_string(),
            );
        }

        if !self.read_timeout.is_zero() && self.read_timeout.as_millis() < 10 {
            errors.push("Read timeout too short (minimum: 10ms)".to_string());
        }

        if !self.write_timeout.is_zero() && self.write_timeout.as_millis() < 10 {
            errors.push("Write timeout too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Socket options and framing limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// SO_RCVBUF for accepted sockets (0 = OS default)
    pub socket_read_buffer_size: usize,

    /// SO_SNDBUF for accepted sockets (0 = OS default)
    pub socket_write_buffer_size: usize,

    /// Keep Nagle's algorithm on; `false` sets TCP_NODELAY
    pub socket_send_delay: bool,

    /// Maximum payload length accepted by the default packer
    pub max_data_size: usize,

    /// Payload serialization format; `None` leaves payloads as raw bytes
    #[serde(with = "format_serde")]
    pub codec: Option<SerializationFormat>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_read_buffer_size: 0,
            socket_write_buffer_size: 0,
            socket_send_delay: false,
            max_data_size: MAX_DATA_SIZE,
            codec: None,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_data_size == 0 {
            errors.push("Max data size cannot be 0".to_string());
        } else if self.max_data_size > u32::MAX as usize {
            errors.push(format!(
                "Max data size too large: {} bytes (header length field is 32 bits)",
                self.max_data_size
            ));
        }

        if self.socket_read_buffer_size > i32::MAX as usize {
            errors.push("Socket read buffer size too large".to_string());
        }

        if self.socket_write_buffer_size > i32::MAX as usize {
            errors.push("Socket write buffer size too large".to_string());
        }

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target server address
    pub address: String,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Timeout for waiting for response messages
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:5896"),
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            response_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if self.response_timeout.as_millis() < 100 {
            errors.push("Response timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("tcp-router"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for the optional payload format; absent or `"none"` means raw bytes
mod format_serde {
    use crate::core::serialization::SerializationFormat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(
        format: &Option<SerializationFormat>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match format {
            Some(format) => format.key().serialize(serializer),
            None => "none".serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SerializationFormat>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let key = String::deserialize(deserializer)?;
        if key.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        SerializationFormat::from_key(&key)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid codec: {key}")))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let server = ServerConfig {
            req_queue_size: 0,
            resp_queue_size: 0,
            write_attempts: 0,
            ..ServerConfig::default()
        };
        assert_eq!(server.effective_req_queue_size(), DEFAULT_REQ_QUEUE_SIZE);
        assert_eq!(server.effective_resp_queue_size(), DEFAULT_RESP_QUEUE_SIZE);
        assert_eq!(server.effective_write_attempts(), DEFAULT_WRITE_ATTEMPTS);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn example_config_parses_back() {
        let text = NetworkConfig::example_config();
        let parsed = NetworkConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.server.address, ServerConfig::default().address);
        assert_eq!(parsed.transport.codec, None);
    }
}
