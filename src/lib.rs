//! Ping Probe - ICMP and TCP ping measurements with streamed progress
//!
//! This crate runs ping-class measurements on a probe: it validates a job,
//! runs the system `ping` tool or a series of TCP connects against the
//! target, streams partial output while the measurement runs and pushes one
//! normalized terminal result. It can be used as a library or through the
//! `ping-probe` executable.
//!
//! # Architecture
//!
//! - **Measurement**: option validation, the ICMP and TCP strategies, output
//!   parsing, progress buffering and result normalization
//! - **Privacy**: refuses to report on private or reserved address space
//! - **Process**: bounded execution of external commands
//! - **Transport**: delivery of progress and results to the controller
//! - **Config**: YAML configuration with environment variable expansion
//!
//! # Example
//!
//! ```rust,no_run
//! use ping_probe::{ChannelTransport, MeasurementRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = MeasurementRunner::default();
//!     let (transport, mut rx) = ChannelTransport::new();
//!
//!     let options = serde_json::json!({
//!         "target": "example.com",
//!         "protocol": "TCP",
//!         "port": 443,
//!         "inProgressUpdates": true,
//!     });
//!     runner.run(&transport, "measurement-1", "test-1", &options).await?;
//!
//!     while let Ok(message) = rx.try_recv() {
//!         println!("{}", serde_json::to_string(&message)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod measurement;
pub mod privacy;
pub mod process;
pub mod stream;
pub mod transport;

pub use config::{AppConfig, ConfigError};
pub use measurement::{
    InvalidOptions, MeasurementOptions, MeasurementResult, MeasurementRunner, MeasurementStatus,
};
pub use privacy::{PrivacyClassifier, ReservedRanges};
pub use transport::{ChannelTransport, JsonLinesTransport, Transport, TransportMessage};
