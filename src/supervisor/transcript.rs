//! Accumulated pppd output for one connection attempt.

use std::io;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::pppd::RawLine;

/// Outcome of a non-blocking drain pass over the reader channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrainOutcome {
    /// Number of lines appended during this pass.
    pub appended: usize,
    /// A transient read error was forwarded; the caller should back off
    /// briefly and retry.
    pub transient: bool,
    /// The reader task has finished and the channel is closed.
    pub closed: bool,
}

/// Append-only transcript of decoded negotiation output.
///
/// Grows monotonically for the lifetime of one connection attempt and is
/// never rewound. Only the supervisor's control loop mutates it; the reader
/// task writes to the intermediate channel, never here.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Vec<String>,
    text: String,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw line, decoding permissively.
    ///
    /// Invalid byte sequences are replaced rather than rejected — pppd
    /// output is UTF-8-ish at best.
    pub fn push_raw(&mut self, raw: &[u8]) {
        let decoded = String::from_utf8_lossy(raw);
        self.text.push_str(&decoded);

        let mut line = decoded.into_owned();
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        self.lines.push(line);
    }

    /// Pop everything currently available from the reader channel without
    /// waiting.
    ///
    /// A forwarded transient (`WouldBlock`) error stops the pass and is
    /// reported through [`DrainOutcome::transient`]; any other forwarded
    /// I/O error is fatal and propagates.
    ///
    /// # Errors
    ///
    /// Returns the forwarded I/O error when it is not transient.
    pub fn drain(&mut self, rx: &mut UnboundedReceiver<RawLine>) -> io::Result<DrainOutcome> {
        let mut outcome = DrainOutcome::default();

        loop {
            match rx.try_recv() {
                Ok(Ok(raw)) => {
                    self.push_raw(&raw);
                    outcome.appended += 1;
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    outcome.transient = true;
                    return Ok(outcome);
                }
                Ok(Err(e)) => return Err(e),
                Err(TryRecvError::Empty) => return Ok(outcome),
                Err(TryRecvError::Disconnected) => {
                    outcome.closed = true;
                    return Ok(outcome);
                }
            }
        }
    }

    /// Drain the channel until the reader task finishes.
    ///
    /// Used once the process has exited: the pipe closes with it, so the
    /// wait is bounded. Transient errors are skipped, fatal ones propagate.
    ///
    /// # Errors
    ///
    /// Returns the forwarded I/O error when it is not transient.
    pub async fn drain_to_eof(
        &mut self,
        rx: &mut UnboundedReceiver<RawLine>,
    ) -> io::Result<usize> {
        let mut appended = 0;

        while let Some(item) = rx.recv().await {
            match item {
                Ok(raw) => {
                    self.push_raw(&raw);
                    appended += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }

        Ok(appended)
    }

    /// The full concatenated output so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The decoded lines, in emission order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of lines accumulated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if nothing has been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
