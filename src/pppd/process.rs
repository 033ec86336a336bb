//! pppd process spawning and control.
//!
//! This module provides a builder for assembling a pppd invocation, along
//! with control methods for the running negotiation process.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdout, Command};

/// Default location of the pppd binary.
pub const DEFAULT_PPPD_PATH: &str = "/usr/sbin/pppd";

/// Default location of the privilege-escalation helper.
pub const DEFAULT_SUDO_PATH: &str = "/usr/bin/sudo";

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("pppd binary not found")]
    NotFound,
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Builder for configuring the pppd argument vector.
///
/// Options are emitted in insertion order, followed by positional arguments,
/// the `call <peer>` pair, and a trailing `nodetach` so pppd stays in the
/// foreground where its output can be observed.
#[derive(Debug, Clone)]
pub struct PppdCommandBuilder {
    peer: String,
    options: Vec<(String, Option<String>)>,
    positional: Vec<String>,
    pppd_path: PathBuf,
    sudo_path: PathBuf,
    use_sudo: bool,
}

impl PppdCommandBuilder {
    /// Create a new builder for dialing the given peer.
    #[must_use]
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            options: Vec::new(),
            positional: Vec::new(),
            pppd_path: PathBuf::from(DEFAULT_PPPD_PATH),
            sudo_path: PathBuf::from(DEFAULT_SUDO_PATH),
            use_sudo: true,
        }
    }

    /// Add a valued option, e.g. `option("mtu", "1492")`.
    #[must_use]
    pub fn option(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((flag.into(), Some(value.into())));
        self
    }

    /// Add a bare flag with no value token, e.g. `flag("noauth")`.
    #[must_use]
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.options.push((flag.into(), None));
        self
    }

    /// Add a positional argument, e.g. a tty device or baud rate.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// Override the pppd binary location.
    #[must_use]
    pub fn pppd_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pppd_path = path.into();
        self
    }

    /// Override the privilege-escalation helper location.
    #[must_use]
    pub fn sudo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sudo_path = path.into();
        self
    }

    /// Enable or disable the privilege-escalation prefix.
    #[must_use]
    pub fn use_sudo(mut self, enabled: bool) -> Self {
        self.use_sudo = enabled;
        self
    }

    /// Get the peer name this builder dials.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Get the configured pppd binary path.
    #[must_use]
    pub fn get_pppd_path(&self) -> &Path {
        &self.pppd_path
    }

    /// Get the configured privilege-escalation helper path.
    #[must_use]
    pub fn get_sudo_path(&self) -> &Path {
        &self.sudo_path
    }

    /// Whether the privilege-escalation prefix is enabled.
    #[must_use]
    pub fn sudo_enabled(&self) -> bool {
        self.use_sudo
    }

    /// Build the pppd argument list (everything after the binary itself).
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        for (flag, value) in &self.options {
            args.push(flag.clone());
            if let Some(value) = value {
                args.push(value.clone());
            }
        }

        args.extend(self.positional.iter().cloned());
        args.push("call".to_string());
        args.push(self.peer.clone());
        args.push("nodetach".to_string());
        args
    }

    /// Build the full command line, including the optional sudo prefix and
    /// the pppd binary path.
    #[must_use]
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if self.use_sudo {
            argv.push(self.sudo_path.to_string_lossy().into_owned());
        }
        argv.push(self.pppd_path.to_string_lossy().into_owned());
        argv.extend(self.build_args());
        argv
    }
}

/// A running pppd negotiation process.
#[derive(Debug)]
pub struct PppdProcess {
    child: Child,
}

impl PppdProcess {
    /// Spawn pppd with the given builder configuration.
    ///
    /// Stdout is piped for the line reader; stderr is discarded so an unread
    /// pipe can never stall the child.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(builder: &PppdCommandBuilder) -> Result<Self, SpawnError> {
        let argv = builder.command_line();

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        tracing::info!(peer = builder.peer(), command = ?argv, "Spawning pppd");
        let child = cmd.spawn().map_err(SpawnError::from_io)?;

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Hang up the link with a timeout.
    ///
    /// On Unix, sends SIGHUP — pppd's documented hangup signal — then waits,
    /// escalating to SIGKILL after the timeout. On other platforms, falls
    /// back to immediate kill.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn hangup(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.hangup_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await
        }
    }

    #[cfg(unix)]
    async fn hangup_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.id() {
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            let _ = kill(nix_pid, Signal::SIGHUP);

            let wait_result = tokio::time::timeout(timeout, self.child.wait()).await;

            match wait_result {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(_) => {
                    // Timeout elapsed, force kill
                    self.child.kill().await
                }
            }
        } else {
            // Process already exited
            Ok(())
        }
    }
}
