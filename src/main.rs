//! Ping Probe Binary Entry Point
//!
//! Runs a single ping measurement and writes every progress update and the
//! terminal result as one JSON document per line to stdout. Logs go to
//! stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use ping_probe::{AppConfig, JsonLinesTransport, MeasurementRunner};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for rejected measurement options.
const EXIT_INVALID_OPTIONS: u8 = 2;

/// Ping Probe - ICMP and TCP ping measurements
#[derive(Parser, Debug)]
#[command(name = "ping-probe", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, env = "PING_PROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Measurement options JSON file, or "-" for stdin
    #[arg(short, long, default_value = "-")]
    options: String,

    /// Test id (generated when omitted)
    #[arg(long, env = "PING_PROBE_TEST_ID")]
    test_id: Option<String>,

    /// Measurement id (generated when omitted)
    #[arg(long, env = "PING_PROBE_MEASUREMENT_ID")]
    measurement_id: Option<String>,

    /// Ping program (overrides config file)
    #[arg(long, env = "PING_PROBE_PING_PROGRAM")]
    ping_program: Option<String>,

    /// Overall ping timeout in seconds (overrides config file)
    #[arg(long, env = "PING_PROBE_PING_TIMEOUT")]
    ping_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ping_probe=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            AppConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => AppConfig::default(),
    };

    // CLI > ENV > config file
    if let Some(program) = cli.ping_program {
        config.ping.program = program;
    }
    if let Some(timeout) = cli.ping_timeout {
        config.ping.timeout_secs = timeout;
    }
    config.validate().context("invalid configuration")?;

    let raw = read_options(&cli.options).await?;
    let options: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(options) => options,
        Err(e) => {
            tracing::error!(error = %e, "Measurement options are not valid JSON");
            return Ok(ExitCode::from(EXIT_INVALID_OPTIONS));
        }
    };

    let test_id = cli
        .test_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let measurement_id = cli
        .measurement_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let runner = MeasurementRunner::from_config(&config).context("invalid configuration")?;
    let transport = JsonLinesTransport::new(tokio::io::stdout());

    match runner
        .run(&transport, &measurement_id, &test_id, &options)
        .await
    {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!(error = %e, "Measurement options rejected");
            Ok(ExitCode::from(EXIT_INVALID_OPTIONS))
        }
    }
}

async fn read_options(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("failed to read options from stdin")?;
        return Ok(raw);
    }

    let path = Path::new(source);
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read options from {}", path.display()))
}
