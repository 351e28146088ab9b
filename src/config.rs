//! # Configuration Management
//!
//! Centralized configuration for packet channels.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`PACKET_CHANNEL_*`)
//!
//! ## Fragmentation
//! `allow_packet_fragmentation` is normally left unset so each channel
//! follows the framing its transport declares. Setting it forces one
//! behavior for every channel built from this configuration.

use crate::error::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default cap on a single buffered packet (MQTT's largest remaining length plus fixed header)
pub const MAX_PACKET_SIZE: usize = 268_435_455 + 5;

/// Default capacity of the receive buffer
pub const INITIAL_BUFFER_CAPACITY: usize = 4096;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ChannelConfig {
    #[serde(default)]
    pub channel: ChannelSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ChannelConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ChannelError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ChannelError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ChannelError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("PACKET_CHANNEL_ALLOW_FRAGMENTATION") {
            config.channel.allow_packet_fragmentation = Some(parse_env_bool(
                "PACKET_CHANNEL_ALLOW_FRAGMENTATION",
                &value,
            )?);
        }

        if let Ok(value) = std::env::var("PACKET_CHANNEL_RECEIVE_TIMEOUT_MS") {
            config.channel.receive_timeout =
                Some(parse_env_millis("PACKET_CHANNEL_RECEIVE_TIMEOUT_MS", &value)?);
        }

        if let Ok(value) = std::env::var("PACKET_CHANNEL_SEND_TIMEOUT_MS") {
            config.channel.send_timeout =
                Some(parse_env_millis("PACKET_CHANNEL_SEND_TIMEOUT_MS", &value)?);
        }

        if let Ok(value) = std::env::var("PACKET_CHANNEL_MAX_PACKET_SIZE") {
            config.channel.max_packet_size = value.parse::<usize>().map_err(|e| {
                ChannelError::Config(format!("Invalid PACKET_CHANNEL_MAX_PACKET_SIZE: {e}"))
            })?;
        }

        if let Ok(level) = std::env::var("PACKET_CHANNEL_LOG_LEVEL") {
            config.logging.log_level = level
                .parse::<Level>()
                .map_err(|_| ChannelError::Config(format!("Invalid log level: {level}")))?;
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
            .map_err(|e| ChannelError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ChannelError::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.channel.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ChannelError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_env_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ChannelError::Config(format!(
            "Invalid {name}: '{other}' (expected true/false)"
        ))),
    }
}

fn parse_env_millis(name: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ChannelError::Config(format!("Invalid {name}: {e}")))
}

/// Per-channel behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Force (true) or forbid (false) multi-write sends; unset follows the transport
    pub allow_packet_fragmentation: Option<bool>,

    /// Deadline for a single `receive` call
    #[serde(default, with = "option_duration_serde")]
    pub receive_timeout: Option<Duration>,

    /// Deadline for a single `send` call, lock wait included
    #[serde(default, with = "option_duration_serde")]
    pub send_timeout: Option<Duration>,

    /// Largest packet the receive buffer may accumulate
    pub max_packet_size: usize,

    /// Capacity reserved for the receive buffer up front
    pub initial_buffer_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            allow_packet_fragmentation: None,
            receive_timeout: None,
            send_timeout: None,
            max_packet_size: MAX_PACKET_SIZE,
            initial_buffer_capacity: INITIAL_BUFFER_CAPACITY,
        }
    }
}

impl ChannelSettings {
    /// Validate channel settings
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_packet_size < 2 {
            errors.push("Max packet size too small (minimum: 2 bytes)".to_string());
        }

        if self.initial_buffer_capacity == 0 {
            errors.push("Initial buffer capacity must be greater than 0".to_string());
        } else if self.initial_buffer_capacity > 16 * 1024 * 1024 {
            errors.push(format!(
                "Initial buffer capacity too large: {} bytes (maximum: 16 MB)",
                self.initial_buffer_capacity
            ));
        }

        if let Some(timeout) = self.receive_timeout {
            if timeout.as_millis() < 10 {
                errors.push("Receive timeout too short (minimum: 10ms)".to_string());
            }
        }

        if let Some(timeout) = self.send_timeout {
            if timeout.as_millis() < 10 {
                errors.push("Send timeout too short (minimum: 10ms)".to_string());
            }
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

    /// Whether to include span open/close events
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("packet-channel"),
            log_level: Level::INFO,
            json_format: false,
            log_spans: false,
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

/// Helper module for optional Duration serialization as milliseconds
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
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
