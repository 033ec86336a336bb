//! Process-table lookup and termination.
//!
//! Finding a pppd instance by its command line is inherently racy and
//! platform-specific, so it lives behind a trait: the supervisor's
//! correctness never depends on process-listing semantics. Everything here
//! is best-effort — failures are logged and swallowed, never surfaced,
//! because disconnect must be safe to call speculatively.

/// Locates and terminates a running negotiation process for a peer.
pub trait ProcessScanner: Send + Sync {
    /// Find any running pppd whose command line was built for `peer_marker`
    /// and request its termination. Missing processes and signal failures
    /// are not errors.
    fn find_and_terminate(&self, peer_marker: &str);
}

/// Scanner that does nothing. Useful in tests and on platforms without a
/// readable process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullScanner;

impl ProcessScanner for NullScanner {
    fn find_and_terminate(&self, peer_marker: &str) {
        tracing::debug!(peer = peer_marker, "Null scanner: nothing terminated");
    }
}

/// `/proc`-walking scanner for Linux.
///
/// Matches a command line that names both the pppd binary and the peer, and
/// hangs the process up with SIGHUP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcTableScanner;

impl ProcessScanner for ProcTableScanner {
    fn find_and_terminate(&self, peer_marker: &str) {
        #[cfg(unix)]
        self.scan_proc(peer_marker);

        #[cfg(not(unix))]
        tracing::debug!(peer = peer_marker, "No process table scan on this platform");
    }
}

#[cfg(unix)]
impl ProcTableScanner {
    fn scan_proc(self, peer_marker: &str) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(entries) = std::fs::read_dir("/proc") else {
            tracing::debug!("/proc not readable, skipping process table scan");
            return;
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
                continue;
            };

            let Ok(raw) = std::fs::read(entry.path().join("cmdline")) else {
                continue;
            };

            // cmdline is NUL-separated
            let argv: Vec<String> = raw
                .split(|&b| b == 0)
                .filter(|part| !part.is_empty())
                .map(|part| String::from_utf8_lossy(part).into_owned())
                .collect();

            if !Self::matches(&argv, peer_marker) {
                continue;
            }

            tracing::info!(pid, peer = peer_marker, "Hanging up running pppd");
            if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGHUP) {
                tracing::warn!(pid, error = %e, "Failed to signal pppd");
            }
        }
    }

    fn matches(argv: &[String], peer_marker: &str) -> bool {
        let runs_pppd = argv
            .iter()
            .any(|arg| arg == "pppd" || arg.ends_with("/pppd"));
        runs_pppd && argv.iter().any(|arg| arg == peer_marker)
    }
}
