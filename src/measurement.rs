//! Measurement Layer
//!
//! Validates a ping job, runs it with the selected strategy and streams its
//! progress and terminal result to a [`Transport`](crate::transport::Transport).
//!
//! # Architecture
//!
//! - [`MeasurementRunner`]: validates options and dispatches to a strategy
//! - [`Prober`]: one measurement strategy (ICMP via `ping`, or TCP connects)
//! - [`OutputParser`]: raw tool output to [`ParseOutput`]
//! - [`ProgressBuffer`]: per-run forwarding of partial output
//!
//! # Example
//!
//! ```rust,no_run
//! use ping_probe::measurement::MeasurementRunner;
//! use ping_probe::transport::ChannelTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = MeasurementRunner::default();
//! let (transport, mut rx) = ChannelTransport::new();
//! let options = serde_json::json!({ "target": "example.com", "packets": 2 });
//!
//! runner.run(&transport, "m-1", "t-1", &options).await?;
//! while let Ok(message) = rx.try_recv() {
//!     println!("{}", serde_json::to_string(&message)?);
//! }
//! # Ok(())
//! # }
//! ```

mod options;
mod progress;
mod result;
mod runner;
mod traits;

pub mod ping;
pub mod tcp;

pub use options::{
    DEFAULT_PACKETS, DEFAULT_PORT, FieldViolation, InvalidOptions, IpVersion, MAX_PACKETS,
    MEASUREMENT_TYPE, MIN_PACKETS, MeasurementOptions, Protocol,
};
pub use progress::{ProgressBuffer, ProgressMode};
pub use result::{
    GENERIC_FAILURE_MESSAGE, MeasurementResult, MeasurementStatus, PRIVATE_IP_MESSAGE,
    ParseOutput, ProgressUpdate, ResultStats, Stats, TIMEOUT_SUFFIX, Timing,
};
pub use runner::MeasurementRunner;
pub use traits::{OutputParser, Prober};
