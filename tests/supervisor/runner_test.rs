//! Lifecycle tests driving `PppLink` against fake negotiation scripts.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pppd_supervisor::pppd::PppdCommandBuilder;
use pppd_supervisor::supervisor::{ConnectionError, ConnectionState, PppLink};
use pppd_supervisor::system::{NullScanner, ProcessScanner};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Write an executable shell script standing in for pppd.
fn fake_pppd(dir: &TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("fake-pppd");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");

    let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

fn link_for(script: PathBuf) -> PppLink {
    let builder = PppdCommandBuilder::new("provider")
        .use_sudo(false)
        .pppd_path(script);

    PppLink::new(builder)
        .with_scanner(Box::new(NullScanner))
        .with_poll_interval(Duration::from_millis(10))
}

const FULL_NEGOTIATION: &str = r"printf 'Serial connection established.\n'
printf 'Connect: ppp0 <--> /dev/ttyS0\n'
printf 'local  IP address 10.0.0.1\n'
printf 'remote IP address 10.0.0.2\n'
printf 'ip-up finished\n'
sleep 5";

#[tokio::test]
async fn connect_succeeds_and_reports_addresses() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let mut link = link_for(fake_pppd(&dir, FULL_NEGOTIATION));

    link.connect().await.expect("link comes up");
    assert_eq!(link.state(), ConnectionState::Connected);

    assert!(link.connected().await.expect("process is alive"));
    assert_eq!(link.laddr(), Some("10.0.0.1"));
    assert_eq!(link.raddr(), Some("10.0.0.2"));
    assert_eq!(link.interface(), Some("ppp0"));
    assert!(link.output().contains("ip-up finished"));

    link.disconnect().await;
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn laddr_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let mut link = link_for(fake_pppd(&dir, FULL_NEGOTIATION));

    link.connect().await.expect("link comes up");

    let first = link.laddr().map(ToOwned::to_owned);
    let second = link.laddr().map(ToOwned::to_owned);
    assert_eq!(first.as_deref(), Some("10.0.0.1"));
    assert_eq!(first, second);

    link.disconnect().await;
}

#[tokio::test]
async fn failure_marker_maps_to_fixed_code_regardless_of_exit() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let script = fake_pppd(&dir, "printf 'Connection terminated.\\n'\nexit 5");
    let mut link = link_for(script);

    let err = link.connect().await.expect_err("marker fails the attempt");
    match err {
        ConnectionError::Protocol {
            code,
            diagnostic,
            transcript,
        } => {
            assert_eq!(code, 22);
            assert_eq!(diagnostic, "Connection terminated");
            assert!(transcript.contains("Connection terminated."));
        }
        other => panic!("Expected Protocol error, got {other:?}"),
    }
    assert_eq!(link.state(), ConnectionState::Failed(22));
}

#[tokio::test]
async fn chap_failure_maps_to_21() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_pppd(&dir, "printf 'CHAP authentication failed\\n'\nexit 1");
    let mut link = link_for(script);

    let err = link.connect().await.expect_err("marker fails the attempt");
    match err {
        ConnectionError::Protocol { code, .. } => assert_eq!(code, 21),
        other => panic!("Expected Protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn early_exit_uses_real_code_and_table_diagnostic() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_pppd(&dir, "exit 3");
    let mut link = link_for(script);

    let err = link.connect().await.expect_err("exit fails the attempt");
    match err {
        ConnectionError::Protocol { code, diagnostic, .. } => {
            assert_eq!(code, 3);
            assert_eq!(diagnostic, "Not executed as root or setuid-root");
        }
        other => panic!("Expected Protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn undocumented_exit_code_gets_generic_diagnostic() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_pppd(&dir, "exit 42");
    let mut link = link_for(script);

    let err = link.connect().await.expect_err("exit fails the attempt");
    match err {
        ConnectionError::Protocol { code, diagnostic, .. } => {
            assert_eq!(code, 42);
            assert_eq!(diagnostic, "Undocumented error occurred");
        }
        other => panic!("Expected Protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn clean_exit_before_any_marker_is_still_a_connect_error() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_pppd(&dir, "exit 0");
    let mut link = link_for(script);

    let err = link.connect().await.expect_err("exit 0 without markers fails");
    match err {
        ConnectionError::Protocol { code, .. } => assert_eq!(code, 0),
        other => panic!("Expected Protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn connected_is_false_after_accepted_exit() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_pppd(&dir, "printf 'ip-up finished\\n'\nexit 0");
    let mut link = link_for(script);

    link.connect().await.expect("marker beats the exit");

    // give the script a moment to finish exiting
    tokio::time::sleep(Duration::from_millis(300)).await;

    // process is gone with an accepted code: down, but not an error
    assert!(!link.connected().await.expect("accepted teardown"));
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn connected_raises_after_unaccepted_exit() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_pppd(&dir, "printf 'ip-up finished\\n'\nsleep 0.3\nexit 10");
    let mut link = link_for(script);

    link.connect().await.expect("link comes up");
    tokio::time::sleep(Duration::from_millis(800)).await;

    let err = link.connected().await.expect_err("bad exit surfaces");
    match err {
        ConnectionError::Protocol { code, diagnostic, .. } => {
            assert_eq!(code, 10);
            assert_eq!(diagnostic, "PPP negotiation failed");
        }
        other => panic!("Expected Protocol error, got {other:?}"),
    }
    assert_eq!(link.state(), ConnectionState::Failed(10));
}

#[tokio::test]
async fn empty_peer_is_rejected_before_spawning() {
    let builder = PppdCommandBuilder::new("").use_sudo(false);
    let mut link = PppLink::new(builder).with_scanner(Box::new(NullScanner));

    let err = link.connect().await.expect_err("no peer to dial");
    assert!(matches!(err, ConnectionError::EmptyPeer));
}

#[tokio::test]
async fn missing_pppd_binary_is_rejected_before_spawning() {
    let builder = PppdCommandBuilder::new("provider")
        .use_sudo(false)
        .pppd_path("/nonexistent/pppd");
    let mut link = PppLink::new(builder).with_scanner(Box::new(NullScanner));

    let err = link.connect().await.expect_err("path validation fails");
    match err {
        ConnectionError::PathNotFound { path } => {
            assert_eq!(path, PathBuf::from("/nonexistent/pppd"));
        }
        other => panic!("Expected PathNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_sudo_helper_is_rejected_when_enabled() {
    let dir = TempDir::new().expect("tempdir");
    let script = fake_pppd(&dir, "exit 0");
    let builder = PppdCommandBuilder::new("provider")
        .pppd_path(script)
        .sudo_path("/nonexistent/sudo");
    let mut link = PppLink::new(builder).with_scanner(Box::new(NullScanner));

    let err = link.connect().await.expect_err("sudo validation fails");
    assert!(matches!(err, ConnectionError::PathNotFound { .. }));
}

#[tokio::test]
async fn disconnect_without_a_running_process_is_a_noop() {
    let builder = PppdCommandBuilder::new("provider").use_sudo(false);
    let mut link = PppLink::new(builder).with_scanner(Box::new(NullScanner));

    link.disconnect().await;
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[derive(Debug, Clone, Default)]
struct RecordingScanner {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ProcessScanner for RecordingScanner {
    fn find_and_terminate(&self, peer_marker: &str) {
        self.calls
            .lock()
            .expect("scanner mutex")
            .push(peer_marker.to_string());
    }
}

#[tokio::test]
async fn disconnect_sweeps_the_process_table_for_the_peer() {
    let scanner = RecordingScanner::default();
    let calls = Arc::clone(&scanner.calls);

    let builder = PppdCommandBuilder::new("provider").use_sudo(false);
    let mut link = PppLink::new(builder).with_scanner(Box::new(scanner));

    link.disconnect().await;

    assert_eq!(*calls.lock().expect("scanner mutex"), ["provider"]);
}

#[tokio::test]
async fn reconnect_runs_a_fresh_attempt() {
    let dir = TempDir::new().expect("tempdir");
    let mut link = link_for(fake_pppd(&dir, FULL_NEGOTIATION));

    link.connect().await.expect("first attempt");
    link.reconnect().await.expect("second attempt");

    assert_eq!(link.state(), ConnectionState::Connected);
    assert_eq!(link.stats().connect_attempts, 2);
    assert_eq!(link.stats().disconnects, 1);

    link.disconnect().await;
}

#[tokio::test]
async fn cancellation_token_aborts_a_stalled_connect() {
    let dir = TempDir::new().expect("tempdir");
    // never prints a marker, never exits on its own
    let script = fake_pppd(&dir, "sleep 30");
    let cancel = CancellationToken::new();
    let mut link = link_for(script).with_cancellation(cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let err = link.connect().await.expect_err("cancelled attempt fails");
    assert!(matches!(err, ConnectionError::Cancelled));
}
