//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, expand_env_vars};
use crate::measurement::ping::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_PING_PROGRAM};
use crate::measurement::tcp::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

fn default_program() -> String {
    DEFAULT_PING_PROGRAM.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_secs()
}

fn default_tcp_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_tcp_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

// =============================================================================
// ICMP Configuration
// =============================================================================

/// Settings for the ICMP strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PingConfig {
    /// Ping binary, looked up on `PATH` unless absolute (default: "ping").
    #[serde(default = "default_program")]
    pub program: String,

    /// Overall wall-clock timeout of one ping run, in seconds (default: 25).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// =============================================================================
// TCP Configuration
// =============================================================================

/// Settings for the TCP strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpConfig {
    /// Pause between connection attempts (default: 500ms).
    #[serde(default = "default_tcp_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-attempt connect timeout (default: 10s).
    #[serde(default = "default_tcp_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// =============================================================================
// Privacy Configuration
// =============================================================================

/// Additional networks treated as private on top of the reserved ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyConfig {
    /// CIDR blocks, e.g. `203.0.113.0/24`.
    #[serde(default)]
    pub blocked_networks: Vec<String>,
}

impl PrivacyConfig {
    /// Parse `blocked_networks`.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` naming the first invalid block.
    pub fn networks(&self) -> Result<Vec<IpNetwork>, ConfigError> {
        self.blocked_networks
            .iter()
            .map(|raw| {
                raw.trim().parse::<IpNetwork>().map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "privacy blocked_networks: invalid network '{raw}': {e}"
                    ))
                })
            })
            .collect()
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
///
/// Every section is optional; an empty document yields the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// ICMP strategy settings.
    #[serde(default)]
    pub ping: PingConfig,

    /// TCP strategy settings.
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Privacy guard settings.
    #[serde(default)]
    pub privacy: PrivacyConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    ///
    /// # Errors
    /// Returns `ConfigError` if the text cannot be parsed or validated.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ping program cannot be empty".to_string(),
            ));
        }

        if self.ping.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "ping timeout_secs must be positive".to_string(),
            ));
        }

        if self.tcp.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "tcp timeout must be positive".to_string(),
            ));
        }

        self.privacy.networks()?;

        Ok(())
    }
}
