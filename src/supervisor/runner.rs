//! Connection supervisor for a pppd-driven PPP link.
//!
//! This module provides the orchestration layer that connects the process
//! spawner, line reader and status classifier together and exposes the
//! typed connection lifecycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::pppd::{self, LineReader, PppdCommandBuilder, PppdProcess, RawLine, SpawnError};
use crate::supervisor::{
    classifier::{self, AddressPatterns, Verdict},
    ConnectionState, LinkStateMachine, LinkStats, Transcript,
};
use crate::system::{ExecutableLocator, FsLocator, ProcTableScanner, ProcessScanner};

/// Default timeout for the SIGHUP-then-kill hangup sequence.
pub const DEFAULT_HANGUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pacing sleep between classification rounds while negotiation is
/// still in flight.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Backoff applied when the reader forwards a transient I/O error.
pub const TRANSIENT_BACKOFF: Duration = Duration::from_secs(1);

/// Exit code reported when the child was terminated by a signal and has no
/// exit status of its own.
const SIGNALED_EXIT_CODE: i32 = -1;

/// Error type for connection lifecycle operations.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    /// A required executable is missing or not executable.
    #[error("{} not found or not executable", path.display())]
    PathNotFound {
        /// The offending path.
        path: PathBuf,
    },
    /// The connection spec has no peer to dial.
    #[error("peer name must not be empty")]
    EmptyPeer,
    /// The process was spawned without a readable stdout.
    #[error("pppd stdout not available")]
    NoStdout,
    /// pppd failed to bring the link up, or the link went down.
    #[error("pppd failed with code {code}: {diagnostic}")]
    Protocol {
        /// pppd exit code, real or mapped from a failure marker.
        code: i32,
        /// Human-readable diagnostic from the exit-code table.
        diagnostic: &'static str,
        /// Full transcript captured up to the failure.
        transcript: String,
    },
    /// Spawning the subprocess failed.
    #[error("Failed to spawn pppd: {0}")]
    Spawn(#[from] SpawnError),
    /// Fatal (non-transient) I/O failure while draining output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The caller's cancellation token fired mid-connect.
    #[error("Connect attempt cancelled")]
    Cancelled,
}

impl ConnectionError {
    fn protocol(code: i32, transcript: &Transcript) -> Self {
        Self::Protocol {
            code,
            diagnostic: pppd::describe(code),
            transcript: transcript.text().to_string(),
        }
    }
}

/// Supervisor for one PPP link driven by a pppd subprocess.
///
/// Owns the subprocess handle, the reader channel and the transcript for the
/// duration of one connection attempt. Instances are not coordinated with
/// each other — callers must serialize connect/disconnect per peer.
pub struct PppLink {
    builder: PppdCommandBuilder,
    locator: Box<dyn ExecutableLocator>,
    scanner: Box<dyn ProcessScanner>,
    process: Option<PppdProcess>,
    lines: Option<UnboundedReceiver<RawLine>>,
    transcript: Transcript,
    patterns: AddressPatterns,
    state: LinkStateMachine,
    laddr: Option<String>,
    raddr: Option<String>,
    interface: Option<String>,
    poll_interval: Duration,
    cancel: Option<CancellationToken>,
}

impl PppLink {
    /// Create a supervisor for the given pppd invocation.
    #[must_use]
    pub fn new(builder: PppdCommandBuilder) -> Self {
        Self {
            builder,
            locator: Box::new(FsLocator),
            scanner: Box::new(ProcTableScanner),
            process: None,
            lines: None,
            transcript: Transcript::new(),
            patterns: AddressPatterns::new(),
            state: LinkStateMachine::new(),
            laddr: None,
            raddr: None,
            interface: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
        }
    }

    /// Substitute the executable locator.
    #[must_use]
    pub fn with_locator(mut self, locator: Box<dyn ExecutableLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Substitute the process-table scanner used by disconnect.
    #[must_use]
    pub fn with_scanner(mut self, scanner: Box<dyn ProcessScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Override the pacing sleep between classification rounds.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Attach a caller-supplied cancellation token.
    ///
    /// The supervisor imposes no timeout of its own; a caller wanting a
    /// connect deadline cancels this token, which kills the subprocess and
    /// fails the attempt with [`ConnectionError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Check if this supervisor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// The peer this supervisor dials.
    #[must_use]
    pub fn peer(&self) -> &str {
        self.builder.peer()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    /// Lifetime counters for this supervisor.
    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.state.stats()
    }

    /// The full negotiation transcript captured so far.
    #[must_use]
    pub fn output(&self) -> &str {
        self.transcript.text()
    }

    /// Bring the link up.
    ///
    /// Validates the executable paths, spawns pppd with the configured
    /// argument vector, and drives the classification loop until a terminal
    /// condition. There is no internal timeout: the loop runs until the
    /// transcript or the process decides the attempt.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::EmptyPeer`] if no peer was configured.
    /// - [`ConnectionError::PathNotFound`] if pppd or the sudo helper is
    ///   missing or not executable.
    /// - [`ConnectionError::Protocol`] when a failure marker appears or the
    ///   process exits before the link comes up.
    /// - [`ConnectionError::Io`] on a fatal read failure.
    /// - [`ConnectionError::Cancelled`] if the caller's token fires.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.builder.peer().is_empty() {
            return Err(ConnectionError::EmptyPeer);
        }

        if self.builder.sudo_enabled() {
            self.check_path(self.builder.get_sudo_path())?;
        }
        self.check_path(self.builder.get_pppd_path())?;

        // Fresh attempt: the transcript and cached addresses are scoped to
        // one connection.
        self.transcript = Transcript::new();
        self.laddr = None;
        self.raddr = None;
        self.interface = None;
        self.state.record_connect_attempt();
        self.state.transition(ConnectionState::Connecting);

        let mut process = PppdProcess::spawn(&self.builder)?;
        let stdout = process.take_stdout().ok_or(ConnectionError::NoStdout)?;
        let mut rx = LineReader::into_channel(stdout);

        let result = self.drive_to_terminal(&mut process, &mut rx).await;

        // Keep the handle and channel for connected()/disconnect()/accessors
        // regardless of how the attempt ended.
        self.process = Some(process);
        self.lines = Some(rx);

        match &result {
            Ok(()) => self.state.transition(ConnectionState::Connected),
            Err(ConnectionError::Protocol { code, .. }) => {
                self.state.transition(ConnectionState::Failed(*code));
            }
            Err(_) => self.state.transition(ConnectionState::Failed(SIGNALED_EXIT_CODE)),
        }

        result
    }

    /// Hang up the link.
    ///
    /// Sends SIGHUP to the owned subprocess when one is still held, then
    /// sweeps the process table for any pppd dialing this peer. Never
    /// raises; safe to call when nothing is running.
    pub async fn disconnect(&mut self) {
        if let Some(process) = self.process.as_mut() {
            if let Err(e) = process.hangup(DEFAULT_HANGUP_TIMEOUT).await {
                tracing::warn!(error = %e, "Failed to hang up owned pppd process");
            }
        }

        self.scanner.find_and_terminate(self.builder.peer());
        self.state.record_disconnect();
        self.state.transition(ConnectionState::Disconnected);
    }

    /// Hang up and dial again.
    ///
    /// No atomicity guarantee: a concurrent connect for the same peer from
    /// elsewhere can interleave between the two steps.
    ///
    /// # Errors
    ///
    /// Propagates any error from the new connect attempt.
    pub async fn reconnect(&mut self) -> Result<(), ConnectionError> {
        self.disconnect().await;
        self.connect().await
    }

    /// Check whether the link is still up.
    ///
    /// A pure observation: drains fresh output and polls the process, never
    /// spawns. Must be called on an instance that has attempted connect().
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Protocol`] if the process exited with a code
    ///   other than the accepted teardown set {0, 5}.
    /// - [`ConnectionError::Io`] on a fatal read failure.
    pub async fn connected(&mut self) -> Result<bool, ConnectionError> {
        let Some(process) = self.process.as_mut() else {
            return Ok(false);
        };

        if let Some(status) = process.try_wait()? {
            let code = status.code().unwrap_or(SIGNALED_EXIT_CODE);

            // Pick up whatever the reader still holds before judging.
            if let Some(rx) = self.lines.as_mut() {
                self.transcript.drain_to_eof(rx).await?;
            }

            if pppd::accepted_on_teardown(code) {
                self.state.transition(ConnectionState::Disconnected);
                return Ok(false);
            }

            self.state.transition(ConnectionState::Failed(code));
            return Err(ConnectionError::protocol(code, &self.transcript));
        }

        if let Some(rx) = self.lines.as_mut() {
            let outcome = self.transcript.drain(rx)?;
            if outcome.transient {
                tracing::debug!("Transient read error while checking link state");
            }
        }

        Ok(classifier::link_is_up(self.transcript.text()))
    }

    /// The negotiated local address, extracted from the transcript on first
    /// access and cached thereafter.
    pub fn laddr(&mut self) -> Option<&str> {
        if self.laddr.is_none() {
            self.refresh_output();
            self.laddr = self.patterns.local(self.transcript.text());
        }
        self.laddr.as_deref()
    }

    /// The negotiated remote address, extracted on first access and cached.
    pub fn raddr(&mut self) -> Option<&str> {
        if self.raddr.is_none() {
            self.refresh_output();
            self.raddr = self.patterns.remote(self.transcript.text());
        }
        self.raddr.as_deref()
    }

    /// The bound network interface, extracted on first access and cached.
    pub fn interface(&mut self) -> Option<&str> {
        if self.interface.is_none() {
            self.refresh_output();
            self.interface = classifier::extract_interface(self.transcript.text());
        }
        self.interface.as_deref()
    }

    /// Run the classification loop until a terminal condition.
    async fn drive_to_terminal(
        &mut self,
        process: &mut PppdProcess,
        rx: &mut UnboundedReceiver<RawLine>,
    ) -> Result<(), ConnectionError> {
        loop {
            if self.is_cancelled() {
                tracing::info!(peer = self.builder.peer(), "Connect attempt cancelled");
                if let Err(e) = process.kill().await {
                    tracing::warn!(error = %e, "Failed to kill pppd after cancellation");
                }
                return Err(ConnectionError::Cancelled);
            }

            let outcome = self.transcript.drain(rx)?;

            let exit_code = process
                .try_wait()?
                .map(|status| status.code().unwrap_or(SIGNALED_EXIT_CODE));

            if exit_code.is_some() {
                // The pipe closes with the process; finish draining so the
                // marker checks see the complete transcript before the exit
                // code is allowed to decide the attempt.
                self.transcript.drain_to_eof(rx).await?;
            }

            match classifier::classify(self.transcript.text(), exit_code) {
                Verdict::Up => {
                    tracing::info!(peer = self.builder.peer(), "PPP link is up");
                    return Ok(());
                }
                Verdict::Down(code) => {
                    tracing::warn!(
                        peer = self.builder.peer(),
                        code,
                        "PPP negotiation failed"
                    );
                    return Err(ConnectionError::protocol(code, &self.transcript));
                }
                Verdict::Pending => {
                    let pause = if outcome.transient {
                        TRANSIENT_BACKOFF
                    } else {
                        self.poll_interval
                    };
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    /// Pull any freshly available lines into the transcript, best-effort.
    fn refresh_output(&mut self) {
        if let Some(rx) = self.lines.as_mut() {
            if let Err(e) = self.transcript.drain(rx) {
                tracing::debug!(error = %e, "Read error while refreshing output");
            }
        }
    }

    fn check_path(&self, path: &Path) -> Result<(), ConnectionError> {
        if self.locator.resolve(path).usable() {
            Ok(())
        } else {
            Err(ConnectionError::PathNotFound {
                path: path.to_path_buf(),
            })
        }
    }
}
