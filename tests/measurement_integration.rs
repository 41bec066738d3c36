//! Measurement Integration Tests
//!
//! End-to-end runs through `MeasurementRunner`: ICMP against fake `ping`
//! scripts, TCP against local listeners.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ping_probe::measurement::ping::PingOutputParser;
use ping_probe::measurement::{
    GENERIC_FAILURE_MESSAGE, InvalidOptions, MeasurementResult, MeasurementStatus,
    PRIVATE_IP_MESSAGE, TIMEOUT_SUFFIX,
};
use ping_probe::{
    AppConfig, ChannelTransport, MeasurementRunner, PrivacyClassifier, TransportMessage,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

/// Classifier that lets loopback targets through.
struct AllowAll;

impl PrivacyClassifier for AllowAll {
    fn is_private(&self, _address: &str) -> bool {
        false
    }
}

/// Write an executable fake `ping` script and return its path.
fn fake_ping(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("ping");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}

fn icmp_runner(program: &Path, timeout_secs: u64) -> MeasurementRunner {
    let mut config = AppConfig::default();
    config.ping.program = program.display().to_string();
    config.ping.timeout_secs = timeout_secs;
    MeasurementRunner::from_config(&config).expect("Failed to build runner")
}

fn tcp_runner() -> MeasurementRunner {
    tcp_runner_with_interval(Duration::from_millis(10))
}

fn tcp_runner_with_interval(interval: Duration) -> MeasurementRunner {
    let mut config = AppConfig::default();
    config.tcp.interval = interval;
    config.tcp.timeout = Duration::from_secs(2);
    MeasurementRunner::with_collaborators(
        &config,
        Arc::new(PingOutputParser::new()),
        Arc::new(AllowAll),
    )
}

/// Run a measurement and split the pushed messages into progress fragments
/// and the terminal result.
async fn run(runner: &MeasurementRunner, options: Value) -> (Vec<String>, MeasurementResult) {
    let (transport, mut rx) = ChannelTransport::new();
    runner
        .run(&transport, "measurement-1", "test-1", &options)
        .await
        .expect("options should be valid");

    let mut fragments = Vec::new();
    let mut terminal = None;
    while let Ok(message) = rx.try_recv() {
        assert!(terminal.is_none(), "message pushed after the terminal result");
        assert_eq!(message.measurement_id(), "measurement-1");
        match message {
            TransportMessage::Progress { result, .. } => fragments.push(result.raw_output),
            TransportMessage::Result { result, .. } => terminal = Some(result),
        }
    }

    (fragments, terminal.expect("no terminal result pushed"))
}

/// Bind a local listener, or `None` when the sandbox forbids it.
async fn bind_local() -> Option<TcpListener> {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => Some(listener),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("Skipping test: cannot bind to local port (permission denied)");
            None
        }
        Err(e) => panic!("Failed to bind: {e}"),
    }
}

const SUCCESS_SCRIPT: &str = r#"
echo 'PING example.com (93.184.216.34) 56(84) bytes of data.'
echo '64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=11.2 ms'
echo '64 bytes from 93.184.216.34: icmp_seq=2 ttl=56 time=11.0 ms'
echo '64 bytes from 93.184.216.34: icmp_seq=3 ttl=56 time=11.5 ms'
echo ''
echo '--- example.com ping statistics ---'
echo '3 packets transmitted, 3 received, 0% packet loss, time 1003ms'
echo 'rtt min/avg/max/mdev = 11.042/11.153/11.245/0.084 ms'
"#;

// =============================================================================
// ICMP
// =============================================================================

#[tokio::test]
async fn test_icmp_success_streams_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let runner = icmp_runner(&fake_ping(&dir, SUCCESS_SCRIPT), 10);

    let (fragments, result) = run(
        &runner,
        json!({ "target": "example.com", "inProgressUpdates": true }),
    )
    .await;

    assert_eq!(fragments.len(), 8);
    assert!(!fragments[0].starts_with('\n'));
    assert!(fragments[1..].iter().all(|f| f.starts_with('\n')));
    assert_eq!(fragments.concat(), result.raw_output);

    assert_eq!(result.status, MeasurementStatus::Finished);
    assert_eq!(result.resolved_hostname.as_deref(), Some("example.com"));
    assert_eq!(result.resolved_address.as_deref(), Some("93.184.216.34"));
    assert_eq!(result.timings.len(), 3);
    assert_eq!(result.stats.rcv, Some(3));
    assert_eq!(result.stats.drop, Some(0));
    assert_eq!(result.stats.loss, Some(0.0));
    assert_eq!(result.stats.avg, Some(11.153));
}

#[tokio::test]
async fn test_icmp_without_progress_pushes_result_only() {
    let dir = tempfile::tempdir().unwrap();
    let runner = icmp_runner(&fake_ping(&dir, SUCCESS_SCRIPT), 10);

    let (fragments, result) = run(&runner, json!({ "target": "example.com" })).await;

    assert!(fragments.is_empty());
    assert_eq!(result.status, MeasurementStatus::Finished);
    assert_eq!(result.stats.total, Some(3.0));
}

#[tokio::test]
async fn test_icmp_zero_stats_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
echo 'PING 1.1.1.1 (1.1.1.1) 56(84) bytes of data.'
echo '64 bytes from 1.1.1.1: icmp_seq=1 ttl=64 time=0.000 ms'
echo ''
echo '--- 1.1.1.1 ping statistics ---'
echo '1 packets transmitted, 1 received, 0% packet loss, time 0ms'
echo 'rtt min/avg/max/mdev = 0.000/0.000/0.000/0.000 ms'
"#;
    let runner = icmp_runner(&fake_ping(&dir, script), 10);

    let (_, result) = run(&runner, json!({ "target": "1.1.1.1", "packets": 1 })).await;

    let stats = serde_json::to_value(&result.stats).unwrap();
    assert_eq!(stats["min"], json!(0.0));
    assert_eq!(stats["avg"], json!(0.0));
    assert_eq!(stats["max"], json!(0.0));
    assert_eq!(stats["loss"], json!(0.0));
    assert_eq!(stats["drop"], json!(0));
}

#[tokio::test]
async fn test_icmp_private_address_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
echo 'PING internal.example (10.0.0.5) 56(84) bytes of data.'
exec sleep 30
"#;
    let runner = icmp_runner(&fake_ping(&dir, script), 20);

    let (fragments, result) = tokio::time::timeout(
        Duration::from_secs(10),
        run(
            &runner,
            json!({ "target": "internal.example", "inProgressUpdates": true }),
        ),
    )
    .await
    .expect("private target should abort the run");

    assert!(fragments.is_empty());
    assert_eq!(result.status, MeasurementStatus::Failed);
    assert_eq!(result.raw_output, PRIVATE_IP_MESSAGE);
    assert_eq!(result.resolved_address, None);
    assert!(result.timings.is_empty());
}

#[tokio::test]
async fn test_icmp_private_address_detected_at_completion() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
echo 'PING internal.example (10.0.0.5) 56(84) bytes of data.'
echo '64 bytes from 10.0.0.5: icmp_seq=1 ttl=64 time=0.5 ms'
"#;
    let runner = icmp_runner(&fake_ping(&dir, script), 10);

    let (fragments, result) = run(&runner, json!({ "target": "internal.example" })).await;

    assert!(fragments.is_empty());
    assert_eq!(result.status, MeasurementStatus::Failed);
    assert_eq!(result.raw_output, PRIVATE_IP_MESSAGE);
}

#[tokio::test]
async fn test_icmp_private_literal_denied_when_tool_fails() {
    let dir = tempfile::tempdir().unwrap();
    let script = "echo 'ping: connect: Network is unreachable' >&2\nexit 2";
    let runner = icmp_runner(&fake_ping(&dir, script), 10);

    let (fragments, result) = run(
        &runner,
        json!({ "target": "10.0.0.5", "protocol": "ICMP", "inProgressUpdates": true }),
    )
    .await;

    assert!(fragments.is_empty());
    assert_eq!(result.status, MeasurementStatus::Failed);
    assert_eq!(result.raw_output, PRIVATE_IP_MESSAGE);
    assert_eq!(result.resolved_address, None);
}

#[tokio::test]
async fn test_icmp_timeout_appends_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
echo 'PING example.com (93.184.216.34) 56(84) bytes of data.'
exec sleep 30
"#;
    let runner = icmp_runner(&fake_ping(&dir, script), 1);

    let (_, result) = run(&runner, json!({ "target": "example.com" })).await;

    assert_eq!(result.status, MeasurementStatus::Failed);
    assert!(result.raw_output.starts_with("PING example.com"));
    assert!(result.raw_output.ends_with(TIMEOUT_SUFFIX));
}

#[tokio::test]
async fn test_icmp_non_zero_exit_parses_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
echo 'PING example.com (93.184.216.34) 56(84) bytes of data.'
echo ''
echo '--- example.com ping statistics ---'
echo '2 packets transmitted, 0 received, 100% packet loss, time 1017ms'
exit 1
"#;
    let runner = icmp_runner(&fake_ping(&dir, script), 10);

    let (_, result) = run(&runner, json!({ "target": "example.com", "packets": 2 })).await;

    assert!(result.raw_output.contains("100% packet loss"));
    assert_eq!(result.stats.rcv, Some(0));
    assert_eq!(result.stats.drop, Some(2));
    assert_eq!(result.stats.loss, Some(1.0));
    assert_eq!(result.stats.min, None);
}

#[tokio::test]
async fn test_icmp_failure_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = "echo 'ping: unknown host' >&2\nexit 2";
    let runner = icmp_runner(&fake_ping(&dir, script), 10);

    let (_, result) = run(&runner, json!({ "target": "example.invalid" })).await;

    assert_eq!(result.status, MeasurementStatus::Failed);
    assert_eq!(result.raw_output, GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn test_icmp_missing_program() {
    let runner = icmp_runner(Path::new("/nonexistent/ping-probe-ping"), 10);

    let (fragments, result) = run(
        &runner,
        json!({ "target": "example.com", "inProgressUpdates": true }),
    )
    .await;

    assert!(fragments.is_empty());
    assert_eq!(result.status, MeasurementStatus::Failed);
    assert_eq!(result.raw_output, GENERIC_FAILURE_MESSAGE);
}

// =============================================================================
// TCP
// =============================================================================

#[tokio::test]
async fn test_tcp_all_attempts_succeed() {
    let Some(listener) = bind_local().await else {
        return;
    };
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let (fragments, result) = run(
        &tcp_runner(),
        json!({
            "target": "127.0.0.1",
            "protocol": "TCP",
            "port": port,
            "packets": 3,
            "inProgressUpdates": true,
        }),
    )
    .await;

    assert_eq!(result.status, MeasurementStatus::Finished);
    assert_eq!(result.resolved_address.as_deref(), Some("127.0.0.1"));
    assert_eq!(result.stats.rcv, Some(3));
    assert_eq!(result.stats.drop, Some(0));
    assert_eq!(result.stats.loss, Some(0.0));
    assert_eq!(result.timings.len(), 3);
    assert!(result.timings.iter().all(|t| t.ttl.is_none()));

    assert_eq!(fragments.len(), 3);
    assert!(fragments[0].starts_with(&format!("TCP PING 127.0.0.1 (127.0.0.1) port {port}")));
    assert!(fragments[1..].iter().all(|f| !f.contains("TCP PING")));
    let streamed = fragments.concat();
    assert!(result.raw_output.starts_with(&streamed));
    assert!(result.raw_output.contains("3 attempts, 3 successful, 0% loss"));
}

#[tokio::test]
async fn test_tcp_partial_success_counts() {
    let Some(listener) = bind_local().await else {
        return;
    };
    let port = listener.local_addr().unwrap().port();
    let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
        drop(listener);
        let _ = accepted_tx.send(());
    });

    let runner = tcp_runner_with_interval(Duration::from_millis(300));
    let (fragments, result) = run(
        &runner,
        json!({
            "target": "127.0.0.1",
            "protocol": "TCP",
            "port": port,
            "packets": 3,
            "inProgressUpdates": true,
        }),
    )
    .await;
    accepted_rx.await.expect("listener task should finish");

    assert_eq!(result.status, MeasurementStatus::Finished);
    assert_eq!(result.stats.rcv, Some(1));
    assert_eq!(result.stats.drop, Some(2));
    assert_eq!(result.stats.loss, Some(2.0 / 3.0));
    assert_eq!(result.timings.len(), 1);
    assert_eq!(result.stats.min, result.stats.max);
    assert_eq!(result.stats.total, Some(result.timings[0].rtt));
    assert!(result.raw_output.contains("3 attempts, 1 successful"));

    assert_eq!(fragments.len(), 3);
    assert!(fragments[0].contains("Reply from 127.0.0.1"));
    assert!(fragments[1].starts_with("No reply from 127.0.0.1"));
    assert!(fragments[2].starts_with("No reply from 127.0.0.1"));
    assert!(result.raw_output.starts_with(&fragments.concat()));
}

#[tokio::test]
async fn test_tcp_refused_port() {
    let Some(listener) = bind_local().await else {
        return;
    };
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (fragments, result) = run(
        &tcp_runner(),
        json!({ "target": "127.0.0.1", "protocol": "tcp", "port": port, "packets": 2 }),
    )
    .await;

    assert!(fragments.is_empty());
    assert_eq!(result.status, MeasurementStatus::Finished);
    assert_eq!(result.stats.rcv, Some(0));
    assert_eq!(result.stats.drop, Some(2));
    assert_eq!(result.stats.loss, Some(1.0));
    assert_eq!(result.stats.min, None);
    assert_eq!(result.stats.total, None);
    assert!(result.timings.is_empty());
    assert!(result.raw_output.contains("No reply from 127.0.0.1"));
}

#[tokio::test]
async fn test_tcp_private_target_denied() {
    let (fragments, result) = run(
        &MeasurementRunner::default(),
        json!({ "target": "10.0.0.5", "protocol": "TCP", "inProgressUpdates": true }),
    )
    .await;

    assert!(fragments.is_empty());
    assert_eq!(result.status, MeasurementStatus::Failed);
    assert_eq!(result.raw_output, PRIVATE_IP_MESSAGE);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_invalid_options_push_nothing() {
    let runner = MeasurementRunner::default();
    let (transport, mut rx) = ChannelTransport::new();

    let err = runner
        .run(&transport, "m", "t", &json!("example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvalidOptions::NotAnObject));

    let err = runner
        .run(
            &transport,
            "m",
            "t",
            &json!({ "target": "2001:db8::1", "ipVersion": 4, "packets": 0 }),
        )
        .await
        .unwrap_err();
    let mut fields = err.fields();
    fields.sort_unstable();
    assert_eq!(fields, vec!["ipVersion", "packets"]);

    assert!(rx.try_recv().is_err());
}
