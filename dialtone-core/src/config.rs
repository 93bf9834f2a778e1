use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub phone: PhoneConfig,
    pub logging: LoggingConfig,
}

/// Listener and WebSocket transport settings for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interval between heartbeat pings sent to each endpoint
    pub ping_interval_secs: u64,
    /// Extra grace after a missed ping before the connection is dropped
    pub ping_timeout_secs: u64,
    /// Allowed CORS origins, `*` allows any
    pub cors_origins: Vec<String>,
    /// Largest accepted WebSocket frame in bytes
    pub max_message_size: usize,
    /// Per-endpoint outbound queue capacity
    pub outbound_buffer: usize,
    /// How long shutdown waits for endpoints to disconnect
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            ping_interval_secs: 10,
            ping_timeout_secs: 5,
            cors_origins: vec!["*".to_string()],
            max_message_size: 64 * 1024,
            outbound_buffer: 256,
            drain_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Longest silence tolerated from an endpoint
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs + self.ping_timeout_secs)
    }

    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Relay routing behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Replace self-reported sender fields with the connection's own id
    pub strict_sender: bool,
}

/// What an endpoint does with a call-request while it is already engaged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Answer the new caller with a call-end and keep the current call
    #[default]
    Reject,
    /// Drop the current call and ring for the new caller
    Overwrite,
}

/// Endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneConfig {
    /// Relay WebSocket URL
    pub server_url: String,
    /// STUN/TURN server URLs handed to the peer connection
    pub ice_servers: Vec<String>,
    pub busy_policy: BusyPolicy,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:4000/ws".to_string(),
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            busy_policy: BusyPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // DIALTONE_SERVER__PORT, DIALTONE_PHONE__ICE_SERVERS=a,b ...
        builder = builder.add_source(
            Environment::with_prefix("DIALTONE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .with_list_parse_key("phone.ice_servers")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Relay listen address
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Check the configuration, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.server.ping_interval_secs == 0 {
            errors.push("server.ping_interval_secs must be greater than 0".to_string());
        }
        if self.server.ping_timeout_secs == 0 {
            errors.push("server.ping_timeout_secs must be greater than 0".to_string());
        }
        if self.server.cors_origins.is_empty() {
            errors.push("server.cors_origins must list at least one origin".to_string());
        }
        if self.server.max_message_size < 1024 {
            errors.push("server.max_message_size must be at least 1024 bytes".to_string());
        }
        if self.server.outbound_buffer == 0 {
            errors.push("server.outbound_buffer must be greater than 0".to_string());
        }

        let url = self.phone.server_url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            errors.push(format!("phone.server_url must be a ws:// or wss:// URL, got '{url}'"));
        }
        for server in &self.phone.ice_servers {
            if !["stun:", "turn:", "turns:"].iter().any(|scheme| server.starts_with(scheme)) {
                errors.push(format!("phone.ice_servers entry '{server}' must start with stun:, turn: or turns:"));
            }
        }

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
