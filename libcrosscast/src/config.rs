//! Configuration management for Crosscast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    pub twitter: Option<TwitterAppConfig>,
    #[serde(default)]
    pub api: ApiEndpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks in daemon mode
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Minutes before a published post's metrics are considered stale
    #[serde(default = "default_metrics_staleness")]
    pub metrics_staleness_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            metrics_staleness_minutes: default_metrics_staleness(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_metrics_staleness() -> i64 {
    50
}

/// External HTTP trigger settings.
///
/// When `secret` is unset the trigger endpoint is open; cross-serve logs
/// a warning at startup so the deployment choice is visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub secret: Option<String>,
    #[serde(default = "default_trigger_bind")]
    pub bind: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            secret: None,
            bind: default_trigger_bind(),
        }
    }
}

fn default_trigger_bind() -> String {
    "127.0.0.1:8385".to_string()
}

/// OAuth application credentials used for the Twitter token refresh
/// exchange (HTTP basic auth at the token endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterAppConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Base URLs for the platform REST surfaces.
///
/// Overridable so tests can point the adapters at a local mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoints {
    #[serde(default = "default_twitter_base")]
    pub twitter_base: String,
    #[serde(default = "default_twitter_upload_base")]
    pub twitter_upload_base: String,
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            twitter_base: default_twitter_base(),
            twitter_upload_base: default_twitter_upload_base(),
            graph_base: default_graph_base(),
        }
    }
}

fn default_twitter_base() -> String {
    "https://api.twitter.com".to_string()
}

fn default_twitter_upload_base() -> String {
    "https://upload.twitter.com".to_string()
}

fn default_graph_base() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

impl ApiEndpoints {
    /// Point every base URL at one host (a test mock server)
    pub fn with_base(base: &str) -> Self {
        Self {
            twitter_base: base.to_string(),
            twitter_upload_base: base.to_string(),
            graph_base: base.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosscast/crosscast.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            trigger: TriggerConfig::default(),
            twitter: None,
            api: ApiEndpoints::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}
