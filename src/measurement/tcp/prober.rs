//! TCP connect round-trip prober.
//!
//! Measures TCP connection latency to `target:port` over a bounded series of
//! attempts and renders the run as a ping-like transcript.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::measurement::{
    IpVersion, MeasurementOptions, MeasurementStatus, ParseOutput, ProgressBuffer, ProgressMode,
    Prober, Stats, Timing,
};
use crate::privacy::PrivacyClassifier;

/// Default pause between attempts (0.5 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Default per-attempt connect timeout (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TcpPingData {
    /// Zero-based attempt index.
    pub seq: u32,
    /// Whether the connection was established.
    pub success: bool,
    /// Connect latency in milliseconds, for successful attempts.
    pub rtt: Option<f64>,
}

impl TcpPingData {
    pub fn reply(seq: u32, rtt: f64) -> Self {
        Self {
            seq,
            success: true,
            rtt: Some(rtt),
        }
    }

    pub fn no_reply(seq: u32) -> Self {
        Self {
            seq,
            success: false,
            rtt: None,
        }
    }
}

/// Aggregate attempts into ping-style statistics.
///
/// `loss` is the failed fraction of all attempts. `total` is the sum of the
/// successful latencies. Values that were never measured stay `None`.
pub fn aggregate(attempts: &[TcpPingData]) -> Stats {
    let rtts: Vec<f64> = attempts.iter().filter_map(|a| a.rtt).collect();
    let received = rtts.len() as u32;
    let dropped = attempts.len() as u32 - received;

    let total = (!rtts.is_empty()).then(|| rtts.iter().sum::<f64>());
    Stats {
        min: rtts.iter().copied().reduce(f64::min),
        max: rtts.iter().copied().reduce(f64::max),
        avg: total.map(|sum| sum / rtts.len() as f64),
        total,
        loss: (!attempts.is_empty()).then(|| f64::from(dropped) / attempts.len() as f64),
        rcv: Some(received),
        drop: Some(dropped),
    }
}

/// Accumulated state of one TCP ping run.
#[derive(Debug, Clone)]
struct TcpPingSession {
    target: String,
    address: IpAddr,
    port: u16,
    attempts: Vec<TcpPingData>,
}

impl TcpPingSession {
    fn endpoint(&self) -> String {
        format!("{} ({}) port {}", self.target, self.address, self.port)
    }

    /// Header plus one line per attempt, each newline-terminated.
    fn transcript(&self) -> String {
        let endpoint = self.endpoint();
        let mut out = format!("TCP PING {endpoint}\n");
        for attempt in &self.attempts {
            let line = match attempt.rtt {
                Some(rtt) => format!(
                    "Reply from {endpoint}: tcp_seq={} time={} ms\n",
                    attempt.seq,
                    format_number(rtt)
                ),
                None => format!("No reply from {endpoint}: tcp_seq={}\n", attempt.seq),
            };
            out.push_str(&line);
        }
        out
    }

    fn finish(self) -> ParseOutput {
        let stats = aggregate(&self.attempts);
        let mut raw_output = self.transcript();

        raw_output.push_str(&format!(
            "\n--- {} tcp ping statistics ---\n{} attempts, {} successful, {}% loss",
            self.target,
            self.attempts.len(),
            stats.rcv.unwrap_or(0),
            format_number(stats.loss.unwrap_or(0.0) * 100.0),
        ));
        if let (Some(min), Some(avg), Some(max)) = (stats.min, stats.avg, stats.max) {
            raw_output.push_str(&format!(
                "\nrtt min/avg/max = {}/{}/{} ms",
                format_number(min),
                format_number(avg),
                format_number(max)
            ));
        }

        let timings = self
            .attempts
            .iter()
            .filter_map(|a| a.rtt)
            .map(|rtt| Timing { ttl: None, rtt })
            .collect();

        ParseOutput {
            status: MeasurementStatus::Finished,
            raw_output,
            resolved_hostname: Some(self.target),
            resolved_address: Some(self.address.to_string()),
            timings: Some(timings),
            stats: Some(stats),
        }
    }
}

/// At most three decimals, without trailing zeros.
fn format_number(value: f64) -> String {
    let s = format!("{value:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1_000_000.0).round() / 1000.0
}

/// Resolve a target to one address of the requested family.
async fn resolve_target(target: &str, ip_version: IpVersion) -> std::io::Result<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host((target, 0))
        .await?
        .map(|addr| addr.ip())
        .find(|ip| ip_version.matches(ip))
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no {ip_version} address found"),
            )
        })
}

/// TCP strategy: timed connects instead of ICMP echo.
pub struct TcpProber {
    interval: Duration,
    timeout: Duration,
    classifier: Arc<dyn PrivacyClassifier>,
}

impl TcpProber {
    /// Create a prober with the default interval and timeout.
    pub fn new(classifier: Arc<dyn PrivacyClassifier>) -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            classifier,
        }
    }

    /// Set the pause between attempts.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the per-attempt connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn attempt(&self, seq: u32, addr: SocketAddr) -> TcpPingData {
        let start = Instant::now();
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                let rtt = round_ms(start.elapsed());
                tracing::debug!(target_addr = %addr, seq, latency_ms = rtt, "TCP attempt successful");
                TcpPingData::reply(seq, rtt)
            }
            Ok(Err(e)) => {
                tracing::debug!(target_addr = %addr, seq, error = %e, "TCP attempt failed");
                TcpPingData::no_reply(seq)
            }
            Err(_) => {
                tracing::debug!(
                    target_addr = %addr,
                    seq,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "TCP attempt timed out"
                );
                TcpPingData::no_reply(seq)
            }
        }
    }
}

impl std::fmt::Debug for TcpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpProber")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Prober for TcpProber {
    fn progress_mode(&self) -> ProgressMode {
        ProgressMode::Diff
    }

    async fn probe(
        &self,
        options: &MeasurementOptions,
        progress: &mut ProgressBuffer<'_>,
    ) -> ParseOutput {
        let address = match resolve_target(&options.target, options.ip_version).await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(
                    target_host = %options.target,
                    error = %e,
                    "Failed to resolve TCP ping target"
                );
                return ParseOutput::failed(format!(
                    "TCP PING {}: failed to resolve target: {e}",
                    options.target
                ));
            }
        };

        if self.classifier.is_private(&address.to_string()) {
            tracing::warn!(
                target_host = %options.target,
                address = %address,
                "Target resolved to a private address, aborting"
            );
            return ParseOutput::private_ip();
        }

        let mut session = TcpPingSession {
            target: options.target.clone(),
            address,
            port: options.port,
            attempts: Vec::with_capacity(usize::from(options.packets)),
        };
        let socket = SocketAddr::new(address, options.port);

        for seq in 0..u32::from(options.packets) {
            if seq > 0 {
                tokio::time::sleep(self.interval).await;
            }

            let attempt = self.attempt(seq, socket).await;
            session.attempts.push(attempt);

            if options.in_progress_updates {
                progress.push_progress(&session.transcript()).await;
            }
        }

        session.finish()
    }
}
