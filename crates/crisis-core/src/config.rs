//! Configuration loading and typed config structures for the crisis service.
//!
//! The canonical configuration lives in `crisis-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and a loader that reads the file and applies environment
//! overrides. Every field has a default, so an empty file is valid.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held a value of the wrong shape.
    #[error("invalid value for {key}: {value}")]
    InvalidOverride {
        /// Environment variable name.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration. Mirrors `crisis-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CrisisConfig {
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerSection,

    /// Connection strings for the store, cache and event bus.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Broadcast hub and `WebSocket` settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Alert lifecycle settings.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Read-through cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default view for the incident map.
    #[serde(default)]
    pub map: MapConfig,
}

impl CrisisConfig {
    /// Load configuration from a YAML file and apply process environment
    /// overrides.
    ///
    /// Recognised variables: `PORT`, `DATABASE_URL`, `DRAGONFLY_URL`,
    /// `NATS_URL`, `EVENT_TOPIC_PREFIX`, `WS_ENABLED`,
    /// `ALERT_BROADCAST_ENABLED`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::InvalidOverride`] for a malformed variable.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults plus process environment overrides, for when no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for a malformed variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its
    /// value. Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if `PORT` is not a port
    /// number or a boolean flag is not `true`/`false`.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(val) = get("PORT") {
            self.server.port =
                val.parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidOverride {
                        key: "PORT",
                        value: format!("{val} ({e})"),
                    })?;
        }
        if let Some(val) = get("DATABASE_URL") {
            self.infrastructure.postgres_url = val;
        }
        if let Some(val) = get("DRAGONFLY_URL") {
            self.infrastructure.dragonfly_url = val;
        }
        if let Some(val) = get("NATS_URL") {
            self.infrastructure.nats_url = val;
        }
        if let Some(val) = get("EVENT_TOPIC_PREFIX") {
            self.infrastructure.nats_topic_prefix = val;
        }
        if let Some(val) = get("WS_ENABLED") {
            self.realtime.ws_enabled = parse_flag("WS_ENABLED", val)?;
        }
        if let Some(val) = get("ALERT_BROADCAST_ENABLED") {
            self.alerts.broadcast_enabled = parse_flag("ALERT_BROADCAST_ENABLED", val)?;
        }
        Ok(())
    }
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidOverride { key, value }),
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Infrastructure connection strings. An empty URL turns that backend off.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// `PostgreSQL` connection string; empty selects the in-memory store.
    #[serde(default)]
    pub postgres_url: String,

    /// Dragonfly (Redis-compatible) URL; empty disables the cache.
    #[serde(default)]
    pub dragonfly_url: String,

    /// NATS URL; empty disables the event bus.
    #[serde(default)]
    pub nats_url: String,

    /// Prefix prepended to every event topic.
    #[serde(default = "default_topic_prefix")]
    pub nats_topic_prefix: String,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            postgres_url: String::new(),
            dragonfly_url: String::new(),
            nats_url: String::new(),
            nats_topic_prefix: default_topic_prefix(),
        }
    }
}

/// Broadcast hub and observer transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RealtimeConfig {
    /// Bounded broadcast queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Per-write timeout after which an observer is treated as dead.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Whether the `WebSocket` endpoint accepts connections.
    #[serde(default = "default_true")]
    pub ws_enabled: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            write_timeout_ms: default_write_timeout_ms(),
            ws_enabled: true,
        }
    }
}

/// Alert lifecycle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AlertsConfig {
    /// When false, issued alerts are persisted but never broadcast.
    #[serde(default = "default_true")]
    pub broadcast_enabled: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            broadcast_enabled: true,
        }
    }
}

/// Read-through cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Whether to use the cache at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry time-to-live in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one event per line.
    #[default]
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

/// Default incident map view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapConfig {
    /// Initial center latitude.
    #[serde(default)]
    pub center_lat: f64,

    /// Initial center longitude.
    #[serde(default)]
    pub center_lon: f64,

    /// Initial zoom level.
    #[serde(default = "default_zoom")]
    pub zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: 0.0,
            center_lon: 0.0,
            zoom: default_zoom(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    3007
}

fn default_topic_prefix() -> String {
    "nexus.crisis".to_owned()
}

const fn default_queue_capacity() -> usize {
    256
}

const fn default_write_timeout_ms() -> u64 {
    10_000
}

const fn default_ttl_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_zoom() -> u8 {
    2
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = CrisisConfig::default();
        assert_eq!(config.server.port, 3007);
        assert_eq!(config.realtime.queue_capacity, 256);
        assert_eq!(config.realtime.write_timeout_ms, 10_000);
        assert!(config.realtime.ws_enabled);
        assert!(config.alerts.broadcast_enabled);
        assert_eq!(config.infrastructure.nats_topic_prefix, "nexus.crisis");
        assert!(config.infrastructure.postgres_url.is_empty());
        assert_eq!(config.map.zoom, 2);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090

infrastructure:
  postgres_url: "postgresql://nexus:nexus@db:5432/nexus_crisis"
  dragonfly_url: "redis://cache:6379"
  nats_url: "nats://bus:4222"
  nats_topic_prefix: "staging.crisis"

realtime:
  queue_capacity: 64
  write_timeout_ms: 2000
  ws_enabled: false

alerts:
  broadcast_enabled: false

cache:
  enabled: true
  ttl_secs: 30

logging:
  level: "debug"
  format: "json"

map:
  center_lat: -1.28
  center_lon: 36.82
  zoom: 6
"#;
        let config = CrisisConfig::parse(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.infrastructure.nats_topic_prefix, "staging.crisis");
        assert_eq!(config.realtime.queue_capacity, 64);
        assert!(!config.realtime.ws_enabled);
        assert!(!config.alerts.broadcast_enabled);
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.map.zoom, 6);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = CrisisConfig::parse("server:\n  port: 4000\n");
        let config = config.ok().unwrap_or_default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.realtime.queue_capacity, 256);
    }

    #[test]
    fn parse_empty_yaml() {
        let config = CrisisConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn env_overrides_replace_yaml_values() {
        let env: BTreeMap<&str, &str> = [
            ("PORT", "8088"),
            ("DATABASE_URL", "postgresql://env/db"),
            ("NATS_URL", "nats://env:4222"),
            ("EVENT_TOPIC_PREFIX", "env.crisis"),
            ("WS_ENABLED", "false"),
            ("ALERT_BROADCAST_ENABLED", "false"),
            ("DRAGONFLY_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = CrisisConfig::default();
        config.infrastructure.dragonfly_url = "redis://yaml:6379".to_owned();
        let result =
            config.apply_env_overrides_from(|key| env.get(key).map(|v| (*v).to_owned()));
        assert!(result.is_ok());

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.infrastructure.postgres_url, "postgresql://env/db");
        assert_eq!(config.infrastructure.nats_url, "nats://env:4222");
        assert_eq!(config.infrastructure.nats_topic_prefix, "env.crisis");
        assert!(!config.realtime.ws_enabled);
        assert!(!config.alerts.broadcast_enabled);
        // Empty values leave the YAML value alone.
        assert_eq!(config.infrastructure.dragonfly_url, "redis://yaml:6379");
    }

    #[test]
    fn malformed_port_override_is_rejected() {
        let mut config = CrisisConfig::default();
        let result = config.apply_env_overrides_from(|key| {
            (key == "PORT").then(|| "not-a-port".to_owned())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidOverride { key: "PORT", .. })
        ));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("crisis-config.yaml");
        if path.exists() {
            let contents = std::fs::read_to_string(&path).unwrap_or_default();
            let config = CrisisConfig::parse(&contents);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
