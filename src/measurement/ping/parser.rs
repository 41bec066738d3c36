//! Parser for iputils-style `ping` output.
//!
//! ```text
//! PING example.com (93.184.216.34) 56(84) bytes of data.
//! 64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=11.2 ms
//!
//! --- example.com ping statistics ---
//! 3 packets transmitted, 3 received, 0% packet loss, time 1003ms
//! rtt min/avg/max/mdev = 11.042/11.153/11.245/0.084 ms
//! ```

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use crate::measurement::{MeasurementStatus, OutputParser, ParseOutput, Stats, Timing};

struct Patterns {
    header_host: Regex,
    header_addr: Regex,
    reply: Regex,
    summary: Regex,
    rtt: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();

    PATTERNS.get_or_init(|| Patterns {
        header_host: Regex::new(r"^PING\s+([^\s(]+)").expect("failed to compile header regex"),
        header_addr: Regex::new(r"\(([0-9A-Fa-f:.]+)(?:%[^)]*)?\)")
            .expect("failed to compile address regex"),
        reply: Regex::new(r"ttl=(\d+)\s+time[=<]\s*([\d.]+)\s*ms")
            .expect("failed to compile reply regex"),
        summary: Regex::new(r"(\d+)\s+packets transmitted,\s+(\d+)\s+(?:packets\s+)?received")
            .expect("failed to compile summary regex"),
        rtt: Regex::new(
            r"(?:rtt|round-trip)\s+min/avg/max(?:/(?:mdev|stddev))?\s*=\s*([\d.]+)/([\d.]+)/([\d.]+)",
        )
        .expect("failed to compile rtt regex"),
    })
}

/// Default [`OutputParser`] for the system `ping` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingOutputParser;

impl PingOutputParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for PingOutputParser {
    fn parse(&self, raw_output: &str) -> ParseOutput {
        let p = patterns();

        let Some(header) = raw_output.lines().find(|l| l.starts_with("PING ")) else {
            return ParseOutput::failed(raw_output);
        };

        let resolved_hostname = p
            .header_host
            .captures(header)
            .map(|c| c[1].to_string());
        let resolved_address = p
            .header_addr
            .captures_iter(header)
            .map(|c| c[1].to_string())
            .find(|addr| addr.parse::<IpAddr>().is_ok());

        let timings: Vec<Timing> = raw_output
            .lines()
            .filter(|l| !l.contains("(DUP!)"))
            .filter_map(|l| p.reply.captures(l))
            .filter_map(|c| {
                Some(Timing {
                    ttl: c[1].parse().ok(),
                    rtt: c[2].parse().ok()?,
                })
            })
            .collect();

        let stats = summary_stats(raw_output, &timings);

        ParseOutput {
            status: MeasurementStatus::Finished,
            raw_output: raw_output.to_string(),
            resolved_hostname,
            resolved_address,
            timings: Some(timings),
            stats: Some(stats),
        }
    }
}

fn summary_stats(raw_output: &str, timings: &[Timing]) -> Stats {
    let p = patterns();
    let mut stats = Stats::default();

    match p.summary.captures(raw_output) {
        Some(c) => {
            let transmitted: u32 = c[1].parse().unwrap_or(0);
            let received: u32 = c[2].parse().unwrap_or(0);
            let dropped = transmitted.saturating_sub(received);

            stats.total = Some(f64::from(transmitted));
            stats.rcv = Some(received);
            stats.drop = Some(dropped);
            stats.loss = (transmitted > 0).then(|| f64::from(dropped) / f64::from(transmitted));
        }
        None => stats.rcv = Some(timings.len() as u32),
    }

    if let Some(c) = p.rtt.captures(raw_output) {
        stats.min = c[1].parse().ok();
        stats.avg = c[2].parse().ok();
        stats.max = c[3].parse().ok();
    } else if !timings.is_empty() {
        let rtts = timings.iter().map(|t| t.rtt);
        stats.min = rtts.clone().reduce(f64::min);
        stats.max = rtts.clone().reduce(f64::max);
        stats.avg = Some(rtts.sum::<f64>() / timings.len() as f64);
    }

    stats
}
