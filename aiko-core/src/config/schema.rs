//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for aiko
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Conversational session relay
    #[serde(default)]
    pub relay: RelayConfig,
    /// Decision engine persistence
    #[serde(default)]
    pub bandit: BanditConfig,
    /// Periodic decision loop
    #[serde(default)]
    pub director: DirectorConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// Relay bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// WebSocket endpoint of the conversational session
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// Fixed pause between reconnect attempts, in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_relay_url() -> String {
    "ws://localhost:12393/client-ws".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Decision engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    /// Where the learned arm state is kept
    #[serde(default = "default_bandit_state_path")]
    pub state_path: String,
}

fn default_bandit_state_path() -> String {
    "data/bandit_state.json".to_string()
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            state_path: default_bandit_state_path(),
        }
    }
}

/// Director loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorConfig {
    /// Whether the director picks actions on its own
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between decisions
    #[serde(default = "default_director_interval")]
    pub interval_s: u64,
}

fn default_true() -> bool {
    true
}

fn default_director_interval() -> u64 {
    5
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_s: default_director_interval(),
        }
    }
}
