//! ICMP ping executor.
//!
//! Runs the system `ping` tool, reparses its output on every line and
//! enforces the privacy guard while the process is still running.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::measurement::{
    GENERIC_FAILURE_MESSAGE, MeasurementOptions, MeasurementStatus, OutputParser, ParseOutput,
    ProgressBuffer, ProgressMode, Prober, TIMEOUT_SUFFIX,
};
use crate::privacy::PrivacyClassifier;
use crate::process::{BoundedProcess, ProcessError};

/// Default ping binary.
pub const DEFAULT_PING_PROGRAM: &str = "ping";

/// Default overall command timeout (25 seconds).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(25);

/// Interval between echo requests passed to the tool, in seconds.
const PROBE_INTERVAL: &str = "0.5";

/// Deadline passed to the tool itself, in seconds.
const TOOL_DEADLINE: &str = "10";

/// Build the ping argument list for validated options.
pub fn ping_args(options: &MeasurementOptions) -> Vec<String> {
    vec![
        format!("-{}", options.ip_version.as_u8()),
        "-n".to_string(),
        "-c".to_string(),
        options.packets.to_string(),
        "-i".to_string(),
        PROBE_INTERVAL.to_string(),
        "-w".to_string(),
        TOOL_DEADLINE.to_string(),
        options.target.clone(),
    ]
}

/// ICMP strategy backed by an external `ping` process.
pub struct PingProber {
    program: String,
    timeout: Duration,
    parser: Arc<dyn OutputParser>,
    classifier: Arc<dyn PrivacyClassifier>,
}

impl PingProber {
    /// Create a prober with the default program and timeout.
    pub fn new(parser: Arc<dyn OutputParser>, classifier: Arc<dyn PrivacyClassifier>) -> Self {
        Self {
            program: DEFAULT_PING_PROGRAM.to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            parser,
            classifier,
        }
    }

    /// Set the program to execute.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the overall command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_private(&self, output: &ParseOutput) -> bool {
        output
            .resolved_address
            .as_deref()
            .is_some_and(|addr| self.classifier.is_private(addr))
    }

    /// Map the process outcome and the collected stdout to a record.
    fn classify(
        &self,
        options: &MeasurementOptions,
        outcome: Result<(), ProcessError>,
        transcript: &str,
    ) -> ParseOutput {
        match outcome {
            Ok(()) => {
                if transcript.is_empty() {
                    tracing::warn!(
                        target_host = %options.target,
                        "Ping exited successfully without output"
                    );
                }
                self.parser.parse(transcript)
            }
            Err(e) if e.is_execution_error() => {
                tracing::debug!(
                    target_host = %options.target,
                    error = %e,
                    stderr = e.stderr().unwrap_or_default().trim(),
                    "Ping command failed"
                );
                let mut output = self.parser.parse(transcript);
                if e.is_timeout() {
                    output.status = MeasurementStatus::Failed;
                    output.raw_output.push_str(TIMEOUT_SUFFIX);
                }
                if output.raw_output.is_empty() {
                    output.raw_output = GENERIC_FAILURE_MESSAGE.to_string();
                }
                output
            }
            Err(e) => {
                tracing::error!(
                    target_host = %options.target,
                    program = %self.program,
                    error = %e,
                    "Unexpected ping failure"
                );
                ParseOutput::generic_failure()
            }
        }
    }
}

impl std::fmt::Debug for PingProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingProber")
            .field("program", &self.program)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Prober for PingProber {
    fn progress_mode(&self) -> ProgressMode {
        ProgressMode::Append
    }

    async fn probe(
        &self,
        options: &MeasurementOptions,
        progress: &mut ProgressBuffer<'_>,
    ) -> ParseOutput {
        let literal = options.target.parse::<IpAddr>().is_ok();
        if literal && self.classifier.is_private(&options.target) {
            tracing::warn!(
                target_host = %options.target,
                "Target is a private address, not starting ping"
            );
            return ParseOutput::private_ip();
        }

        let args = ping_args(options);
        tracing::debug!(program = %self.program, args = ?args, "Starting ping");

        let mut process = match BoundedProcess::spawn(&self.program, &args, self.timeout) {
            Ok(process) => process,
            Err(e) => return self.classify(options, Err(e), ""),
        };

        let mut transcript = String::new();
        let mut lines = 0usize;
        let mut private_ip = false;

        let read = loop {
            let line = match process.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            if lines > 0 {
                transcript.push('\n');
            }
            transcript.push_str(&line);
            lines += 1;

            if !options.in_progress_updates {
                continue;
            }

            let partial = self.parser.parse(&transcript);
            if self.is_private(&partial) {
                tracing::warn!(
                    target_host = %options.target,
                    address = partial.resolved_address.as_deref().unwrap_or_default(),
                    "Target resolved to a private address, aborting"
                );
                private_ip = true;
                if let Err(e) = process.kill() {
                    tracing::warn!(error = %e, "Failed to kill ping process");
                }
                break Ok(());
            }

            progress.push_progress(&line).await;
        };

        let outcome = match read {
            Ok(()) => process.wait().await,
            Err(e) => Err(e),
        };
        let output = self.classify(options, outcome, &transcript);

        if private_ip || self.is_private(&output) {
            return ParseOutput::private_ip();
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::ping::PingOutputParser;
    use crate::measurement::{IpVersion, Protocol};
    use crate::privacy::ReservedRanges;
    use crate::transport::ChannelTransport;

    fn options(target: &str) -> MeasurementOptions {
        MeasurementOptions {
            in_progress_updates: false,
            target: target.to_string(),
            packets: 3,
            protocol: Protocol::Icmp,
            port: 80,
            ip_version: IpVersion::V4,
        }
    }

    #[tokio::test]
    async fn test_private_literal_target_is_denied_without_spawning() {
        let prober = PingProber::new(
            Arc::new(PingOutputParser::new()),
            Arc::new(ReservedRanges::new()),
        )
        .with_program("/nonexistent/ping-probe-ping");
        let (transport, mut rx) = ChannelTransport::new();
        let mut progress = ProgressBuffer::new(&transport, "t", "m", ProgressMode::Append);

        let mut opts = options("10.0.0.5");
        opts.in_progress_updates = true;
        let output = prober.probe(&opts, &mut progress).await;

        assert_eq!(output, ParseOutput::private_ip());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ping_args_template() {
        assert_eq!(
            ping_args(&options("example.com")),
            vec!["-4", "-n", "-c", "3", "-i", "0.5", "-w", "10", "example.com"]
        );

        let mut v6 = options("::1");
        v6.ip_version = IpVersion::V6;
        v6.packets = 16;
        let args = ping_args(&v6);
        assert_eq!(args[0], "-6");
        assert_eq!(args[3], "16");
        assert_eq!(args.last().map(String::as_str), Some("::1"));
    }
}
