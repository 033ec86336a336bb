//! pppd exit-status table.
//!
//! pppd documents its exit codes in pppd(8); this module maps them to the
//! diagnostic strings surfaced in [`ConnectionError::Protocol`].
//!
//! [`ConnectionError::Protocol`]: crate::supervisor::ConnectionError::Protocol

/// Diagnostic used for exit codes outside the documented range.
pub const UNDOCUMENTED: &str = "Undocumented error occurred";

/// Exit codes that do not indicate a fault when the link is torn down.
///
/// 0 is a clean exit; 5 means pppd received SIGINT, SIGTERM or SIGHUP,
/// which is how this crate hangs up a link on purpose.
pub const ACCEPTED_EXIT_CODES: [i32; 2] = [0, 5];

/// Look up the diagnostic string for a pppd exit code.
#[must_use]
pub fn describe(code: i32) -> &'static str {
    match code {
        1 => "Fatal error occurred",
        2 => "Error processing options",
        3 => "Not executed as root or setuid-root",
        4 => "No kernel support, PPP kernel driver not loaded",
        5 => "Received SIGINT, SIGTERM or SIGHUP",
        6 => "Modem could not be locked",
        7 => "Modem could not be opened",
        8 => "Connect script failed",
        9 => "pty argument command could not be run",
        10 => "PPP negotiation failed",
        11 => "Peer failed (or refused) to authenticate",
        12 => "The link was terminated because it was idle",
        13 => "The link was terminated because the connection time limit was reached",
        14 => "Callback negotiated",
        15 => "The link was terminated because the peer was not responding to echo requests",
        16 => "The link was terminated by the modem hanging up",
        17 => "PPP negotiation failed because serial loopback was detected",
        18 => "Init script failed",
        19 => "Failed to authenticate to the peer",
        20 => "Failed to allocate PPP",
        21 => "CHAP authentication failed",
        22 => "Connection terminated",
        _ => UNDOCUMENTED,
    }
}

/// Returns true if the code is an accepted (non-error) teardown status.
#[must_use]
pub fn accepted_on_teardown(code: i32) -> bool {
    ACCEPTED_EXIT_CODES.contains(&code)
}
