//! Terminal-condition classification of negotiation output.
//!
//! pppd reports status only as free-form log lines, so link state is
//! inferred from a fixed set of substrings. Two success markers are accepted
//! independently — negotiation setups vary in which line they emit —
//! and three failure substrings map to fixed exit codes regardless of how
//! the process actually exits.

use regex::Regex;

/// Strict success marker: the ip-up script has run to completion.
pub const MARKER_IP_UP: &str = "ip-up finished";

/// Loose success marker: an address was negotiated for the peer.
pub const MARKER_REMOTE_IP: &str = "remote IP address";

/// Failure substrings and the fixed exit codes they map to.
const FAILURE_MARKERS: [(&str, i32); 3] = [
    ("Couldn't allocate PPP", 20),
    ("CHAP authentication failed", 21),
    ("Connection terminated", 22),
];

/// Classification of the transcript and process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The link is up; connect() may return.
    Up,
    /// Terminal failure with the given pppd exit code.
    Down(i32),
    /// Not yet terminal; keep polling.
    Pending,
}

/// Returns true if the transcript contains either success marker.
#[must_use]
pub fn link_is_up(output: &str) -> bool {
    output.contains(MARKER_IP_UP) || output.contains(MARKER_REMOTE_IP)
}

/// Decide the current verdict, in priority order: success markers, failure
/// substrings, process exit, pending.
///
/// `exit_code` is the result of a non-blocking process poll; at connect time
/// any exit before a success marker is a failure, including codes that the
/// later connected() check would accept.
#[must_use]
pub fn classify(output: &str, exit_code: Option<i32>) -> Verdict {
    if link_is_up(output) {
        return Verdict::Up;
    }

    for (marker, code) in FAILURE_MARKERS {
        if output.contains(marker) {
            tracing::debug!(marker, code, "Failure marker found in output");
            return Verdict::Down(code);
        }
    }

    if let Some(code) = exit_code {
        return Verdict::Down(code);
    }

    Verdict::Pending
}

/// Extract the bound interface name from a `Connect:` line.
///
/// pppd logs `Connect: ppp0 <--> /dev/ttyS0`; the second whitespace token is
/// the interface.
#[must_use]
pub fn extract_interface(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Connect: "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(ToOwned::to_owned)
}

/// Compiled patterns for negotiated-address extraction.
#[derive(Debug, Clone)]
pub struct AddressPatterns {
    local: Regex,
    remote: Regex,
}

impl AddressPatterns {
    /// Compile the fixed address patterns.
    ///
    /// pppd prints the local line with two spaces so the addresses align in
    /// its log output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            local: Regex::new(r"local  IP address ([\d.]+)").expect("hard-coded pattern compiles"),
            remote: Regex::new(r"remote IP address ([\d.]+)").expect("hard-coded pattern compiles"),
        }
    }

    /// First negotiated local address in the output, if any.
    #[must_use]
    pub fn local(&self, output: &str) -> Option<String> {
        self.local
            .captures(output)
            .map(|caps| caps[1].to_string())
    }

    /// First negotiated remote address in the output, if any.
    #[must_use]
    pub fn remote(&self, output: &str) -> Option<String> {
        self.remote
            .captures(output)
            .map(|caps| caps[1].to_string())
    }
}

impl Default for AddressPatterns {
    fn default() -> Self {
        Self::new()
    }
}
