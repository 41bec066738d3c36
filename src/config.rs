//! Configuration module for the ping probe.
//!
//! Provides YAML-based configuration loading and validation for:
//! - ICMP settings (ping program, overall command timeout)
//! - TCP settings (attempt interval, per-attempt timeout)
//! - Privacy settings (additional blocked networks)

mod app;
mod validation;

pub use app::{AppConfig, PingConfig, PrivacyConfig, TcpConfig};
pub use validation::{ConfigError, expand_env_vars};
