//! Measurement dispatcher.

use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use crate::config::{AppConfig, ConfigError};
use crate::measurement::ping::{PingOutputParser, PingProber};
use crate::measurement::tcp::TcpProber;
use crate::measurement::{
    InvalidOptions, MeasurementOptions, MeasurementResult, OutputParser, ProgressBuffer, Prober,
    Protocol,
};
use crate::privacy::{PrivacyClassifier, ReservedRanges};
use crate::transport::Transport;

/// Validates ping jobs and runs them with the matching strategy.
///
/// The runner holds no per-run state and can serve concurrent runs.
pub struct MeasurementRunner {
    icmp: PingProber,
    tcp: TcpProber,
}

impl MeasurementRunner {
    /// Create a runner from explicit strategies.
    pub fn new(icmp: PingProber, tcp: TcpProber) -> Self {
        Self { icmp, tcp }
    }

    /// Create a runner with the default parser and privacy classifier.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if a configured blocked network
    /// is invalid.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let ranges = config
            .privacy
            .networks()?
            .into_iter()
            .fold(ReservedRanges::new(), ReservedRanges::with_network);

        Ok(Self::with_collaborators(
            config,
            Arc::new(PingOutputParser::new()),
            Arc::new(ranges),
        ))
    }

    /// Create a runner sharing the given parser and classifier.
    pub fn with_collaborators(
        config: &AppConfig,
        parser: Arc<dyn OutputParser>,
        classifier: Arc<dyn PrivacyClassifier>,
    ) -> Self {
        let icmp = PingProber::new(parser, Arc::clone(&classifier))
            .with_program(config.ping.program.clone())
            .with_timeout(config.ping.timeout());
        let tcp = TcpProber::new(classifier)
            .with_interval(config.tcp.interval)
            .with_timeout(config.tcp.timeout);

        Self::new(icmp, tcp)
    }

    fn prober(&self, protocol: Protocol) -> &dyn Prober {
        match protocol {
            Protocol::Tcp => &self.tcp,
            Protocol::Icmp => &self.icmp,
        }
    }

    /// Run one measurement.
    ///
    /// Progress updates and exactly one terminal result are pushed to
    /// `transport`. Measurement failures end up in the terminal result.
    ///
    /// # Errors
    /// Returns `InvalidOptions` when `options` fail validation. Nothing is
    /// started and nothing is pushed in that case.
    pub async fn run(
        &self,
        transport: &dyn Transport,
        measurement_id: &str,
        test_id: &str,
        options: &Value,
    ) -> Result<(), InvalidOptions> {
        let span = tracing::info_span!("measurement", test_id, measurement_id);

        let options = match MeasurementOptions::from_value(options) {
            Ok(options) => options,
            Err(e) => {
                span.in_scope(|| tracing::warn!(error = %e, "Rejected measurement options"));
                return Err(e);
            }
        };

        async {
            let prober = self.prober(options.protocol);
            tracing::debug!(
                target_host = %options.target,
                protocol = %options.protocol,
                packets = options.packets,
                ip_version = options.ip_version.as_u8(),
                "Starting measurement"
            );

            let mut progress =
                ProgressBuffer::new(transport, test_id, measurement_id, prober.progress_mode());
            let output = prober.probe(&options, &mut progress).await;

            tracing::info!(status = %output.status, "Measurement completed");
            progress.push_result(MeasurementResult::from(output)).await;
        }
        .instrument(span)
        .await;

        Ok(())
    }
}

impl Default for MeasurementRunner {
    fn default() -> Self {
        Self::with_collaborators(
            &AppConfig::default(),
            Arc::new(PingOutputParser::new()),
            Arc::new(ReservedRanges::new()),
        )
    }
}

impl std::fmt::Debug for MeasurementRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementRunner")
            .field("icmp", &self.icmp)
            .field("tcp", &self.tcp)
            .finish()
    }
}
