//! Measurement options: shape validation, defaults and ip version inference.

use std::fmt;
use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Tag identifying a ping-class measurement.
pub const MEASUREMENT_TYPE: &str = "ping";

/// Smallest accepted packet count.
pub const MIN_PACKETS: u8 = 1;

/// Largest accepted packet count.
pub const MAX_PACKETS: u8 = 16;

/// Default packet count.
pub const DEFAULT_PACKETS: u8 = 3;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 80;

/// Longest accepted hostname (RFC 1035).
const MAX_HOSTNAME_LEN: usize = 253;

const KNOWN_FIELDS: &[&str] = &[
    "type",
    "inProgressUpdates",
    "target",
    "packets",
    "protocol",
    "port",
    "ipVersion",
];

/// Measurement strategy requested by the controller.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Protocol {
    /// OS-level ICMP ping.
    #[default]
    Icmp,
    /// TCP connect round trips.
    Tcp,
}

/// IP family used to reach the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpVersion {
    #[default]
    V4,
    V6,
}

impl IpVersion {
    /// Numeric form (`4` or `6`).
    pub fn as_u8(self) -> u8 {
        match self {
            Self::V4 => 4,
            Self::V6 => 6,
        }
    }

    /// Whether `addr` belongs to this family.
    pub fn matches(self, addr: &IpAddr) -> bool {
        matches!(
            (self, addr),
            (Self::V4, IpAddr::V4(_)) | (Self::V6, IpAddr::V6(_))
        )
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPv{}", self.as_u8())
    }
}

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Options rejected before any measurement side effect.
#[derive(Debug, Error)]
pub enum InvalidOptions {
    /// The options payload is not a JSON object.
    #[error("measurement options must be a JSON object")]
    NotAnObject,

    /// One or more fields failed validation.
    #[error("invalid measurement options: {}", join_violations(.0))]
    Fields(Vec<FieldViolation>),
}

impl InvalidOptions {
    /// Names of the fields that caused the rejection.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::NotAnObject => Vec::new(),
            Self::Fields(violations) => violations.iter().map(|v| v.field.as_str()).collect(),
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validated, immutable options of one measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementOptions {
    pub in_progress_updates: bool,
    pub target: String,
    pub packets: u8,
    pub protocol: Protocol,
    pub port: u16,
    pub ip_version: IpVersion,
}

impl MeasurementOptions {
    /// Validate raw options and fill in defaults.
    ///
    /// All violations are collected so the caller sees every offending field
    /// at once.
    ///
    /// # Errors
    /// Returns [`InvalidOptions`] if the payload has an unknown field, a field
    /// of the wrong type, or a value out of range.
    pub fn from_value(value: &Value) -> Result<Self, InvalidOptions> {
        let map = value.as_object().ok_or(InvalidOptions::NotAnObject)?;
        let mut violations = Vec::new();

        for key in map.keys() {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                violations.push(FieldViolation::new(key.as_str(), "unknown field"));
            }
        }

        if let Some(kind) = field::<String>(map, "type", &mut violations) {
            if kind != MEASUREMENT_TYPE {
                violations.push(FieldViolation::new(
                    "type",
                    format!("must be \"{MEASUREMENT_TYPE}\""),
                ));
            }
        }

        let in_progress_updates =
            field::<bool>(map, "inProgressUpdates", &mut violations).unwrap_or(false);

        let target = match field::<String>(map, "target", &mut violations) {
            Some(target) if is_valid_target(&target) => Some(target),
            Some(_) => {
                violations.push(FieldViolation::new(
                    "target",
                    "must be a hostname or an IP address",
                ));
                None
            }
            None if !map.contains_key("target") => {
                violations.push(FieldViolation::new("target", "is required"));
                None
            }
            None => None,
        };

        let packets = match field::<i64>(map, "packets", &mut violations) {
            Some(n) if (i64::from(MIN_PACKETS)..=i64::from(MAX_PACKETS)).contains(&n) => n as u8,
            Some(_) => {
                violations.push(FieldViolation::new(
                    "packets",
                    format!("must be between {MIN_PACKETS} and {MAX_PACKETS}"),
                ));
                DEFAULT_PACKETS
            }
            None => DEFAULT_PACKETS,
        };

        let protocol = match field::<String>(map, "protocol", &mut violations) {
            Some(raw) => raw.parse::<Protocol>().unwrap_or_else(|_| {
                violations.push(FieldViolation::new("protocol", "must be ICMP or TCP"));
                Protocol::default()
            }),
            None => Protocol::default(),
        };

        let port = match field::<i64>(map, "port", &mut violations) {
            Some(n) => u16::try_from(n).unwrap_or_else(|_| {
                violations.push(FieldViolation::new("port", "must be between 0 and 65535"));
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let requested = match field::<i64>(map, "ipVersion", &mut violations) {
            Some(4) => Some(IpVersion::V4),
            Some(6) => Some(IpVersion::V6),
            Some(_) => {
                violations.push(FieldViolation::new("ipVersion", "must be 4 or 6"));
                None
            }
            None => None,
        };

        let ip_version = match target.as_deref().map(str::parse::<IpAddr>) {
            Some(Ok(addr)) => {
                let literal = if addr.is_ipv4() {
                    IpVersion::V4
                } else {
                    IpVersion::V6
                };
                if requested.is_some_and(|v| v != literal) {
                    violations.push(FieldViolation::new(
                        "ipVersion",
                        format!("must be {} for an {literal} target", literal.as_u8()),
                    ));
                }
                literal
            }
            _ => requested.unwrap_or_default(),
        };

        match target {
            Some(target) if violations.is_empty() => Ok(Self {
                in_progress_updates,
                target,
                packets,
                protocol,
                port,
                ip_version,
            }),
            _ => Err(InvalidOptions::Fields(violations)),
        }
    }
}

/// Deserialize an optional field, recording a violation on a type mismatch.
fn field<T: DeserializeOwned>(
    map: &Map<String, Value>,
    name: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<T> {
    let value = map.get(name)?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            violations.push(FieldViolation::new(name, e.to_string()));
            None
        }
    }
}

fn is_valid_target(target: &str) -> bool {
    static LABEL_REGEX: OnceLock<Regex> = OnceLock::new();

    if target.parse::<IpAddr>().is_ok() {
        return true;
    }

    let hostname = target.strip_suffix('.').unwrap_or(target);
    if hostname.is_empty() || hostname.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    let label = LABEL_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_](?:[A-Za-z0-9_-]{0,61}[A-Za-z0-9_])?$")
            .expect("failed to compile hostname label regex")
    });
    hostname.split('.').all(|part| label.is_match(part))
}
