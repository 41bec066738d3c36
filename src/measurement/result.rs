//! Measurement records and their normalized JSON form.
//!
//! - [`ParseOutput`]: internal record produced by parsing ping output or by
//!   aggregating TCP attempts. Fields the parser could not compute are `None`.
//! - [`MeasurementResult`]: externally visible terminal result. Built from a
//!   [`ParseOutput`] through normalization.
//! - [`ProgressUpdate`]: partial result carrying raw text only.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Raw output of every measurement that resolved to a private address.
pub const PRIVATE_IP_MESSAGE: &str = "Private IP ranges are not allowed.";

/// Raw output used when a failure leaves nothing better to report.
pub const GENERIC_FAILURE_MESSAGE: &str = "Test failed. Please try again.";

/// Suffix appended to the raw output of a timed out measurement command.
pub const TIMEOUT_SUFFIX: &str = "\n\nmeasurement command timed out";

/// Terminal status of a measurement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MeasurementStatus {
    /// The measurement ran to completion.
    Finished,
    /// The measurement could not be completed.
    Failed,
}

/// Round-trip time of a single reply, in receive order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Reply TTL, if the tool reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    /// Round-trip time in milliseconds.
    pub rtt: f64,
}

/// Aggregate statistics as computed by a parser or the TCP prober.
///
/// `loss` is a fraction in `[0, 1]`. All latencies are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub total: Option<f64>,
    pub loss: Option<f64>,
    pub rcv: Option<u32>,
    pub drop: Option<u32>,
}

/// Structured record of a (possibly still running) measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub status: MeasurementStatus,
    pub raw_output: String,
    pub resolved_hostname: Option<String>,
    pub resolved_address: Option<String>,
    pub timings: Option<Vec<Timing>>,
    pub stats: Option<Stats>,
}

impl ParseOutput {
    /// A failed record with only a raw output.
    pub fn failed(raw_output: impl Into<String>) -> Self {
        Self {
            status: MeasurementStatus::Failed,
            raw_output: raw_output.into(),
            resolved_hostname: None,
            resolved_address: None,
            timings: None,
            stats: None,
        }
    }

    /// The fixed result of a measurement that resolved to a private address.
    pub fn private_ip() -> Self {
        Self::failed(PRIVATE_IP_MESSAGE)
    }

    /// The fixed result of an unexpected failure.
    pub fn generic_failure() -> Self {
        Self::failed(GENERIC_FAILURE_MESSAGE)
    }
}

/// Partial update pushed while a measurement is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub raw_output: String,
}

impl ProgressUpdate {
    pub fn new(raw_output: impl Into<String>) -> Self {
        Self {
            raw_output: raw_output.into(),
        }
    }
}

/// Normalized statistics. Every field is a number or `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub total: Option<f64>,
    pub loss: Option<f64>,
    pub rcv: Option<u32>,
    pub drop: Option<u32>,
}

/// Terminal result in its externally visible JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResult {
    pub status: MeasurementStatus,
    pub raw_output: String,
    pub resolved_hostname: Option<String>,
    pub resolved_address: Option<String>,
    pub timings: Vec<Timing>,
    pub stats: ResultStats,
}

/// Keep a measured value, including `0`. Only "no value" becomes `None`.
fn measured(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

impl From<Stats> for ResultStats {
    fn from(stats: Stats) -> Self {
        Self {
            min: measured(stats.min),
            max: measured(stats.max),
            avg: measured(stats.avg),
            total: measured(stats.total),
            loss: measured(stats.loss),
            rcv: stats.rcv,
            drop: stats.drop,
        }
    }
}

impl From<ParseOutput> for MeasurementResult {
    fn from(output: ParseOutput) -> Self {
        Self {
            status: output.status,
            raw_output: output.raw_output,
            resolved_hostname: output.resolved_hostname,
            resolved_address: output.resolved_address,
            timings: output.timings.unwrap_or_default(),
            stats: output.stats.map(ResultStats::from).unwrap_or_default(),
        }
    }
}
