//! Probe configuration errors and pre-parse text substitution.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Errors raised while loading the probe configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read probe config: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid YAML or does not match the config schema.
    #[error("malformed probe config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A value parsed but is out of range or otherwise unusable.
    #[error("invalid probe config: {0}")]
    ValidationError(String),
}

fn env_reference() -> &'static Regex {
    static ENV_REFERENCE: OnceLock<Regex> = OnceLock::new();

    ENV_REFERENCE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env reference regex")
    })
}

/// Substitute `${NAME}` and `${NAME:-fallback}` references with environment
/// values.
///
/// A reference to an unset variable takes its fallback, or the empty string
/// when none is given. Text outside references is left untouched.
pub fn expand_env_vars(input: &str) -> String {
    env_reference()
        .replace_all(input, |caps: &Captures| {
            let fallback = caps.get(2).map_or("", |m| m.as_str());
            std::env::var(&caps[1]).unwrap_or_else(|_| fallback.to_string())
        })
        .into_owned()
}
