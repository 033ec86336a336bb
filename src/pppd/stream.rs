//! Line-by-line reader for pppd stdout.
//!
//! pppd has no structured output format; status is only available as
//! free-form log lines. The reader ships raw byte lines through a channel so
//! the supervisor's control loop can poll without ever blocking on the pipe.

use std::io;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStdout;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Items delivered by the reader: one raw line per entry, or a forwarded
/// read error. Decoding is left to the consumer.
pub type RawLine = io::Result<Vec<u8>>;

/// Background line reader for a pppd stdout handle.
pub struct LineReader;

impl LineReader {
    /// Spawn a background task that reads raw lines into an unbounded
    /// channel.
    ///
    /// The task ends silently at end-of-stream or when the receiver is
    /// dropped. Read errors are forwarded through the channel rather than
    /// panicking across the task boundary; a transient `WouldBlock` is
    /// forwarded and reading continues, any other error ends the task after
    /// forwarding. Capacity is unbounded — negotiation output is small and
    /// bounded by the program's lifetime.
    #[must_use]
    pub fn into_channel(stdout: ChildStdout) -> UnboundedReceiver<RawLine> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut buf = Vec::new();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(buf)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let transient = e.kind() == io::ErrorKind::WouldBlock;
                        if tx.send(Err(e)).is_err() || !transient {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("pppd stdout reader finished");
        });

        rx
    }
}

/// Read decoded lines from a pppd stdout handle as an async stream.
///
/// Lines are decoded permissively — invalid byte sequences are replaced, not
/// fatal — and delivered without the trailing newline. Useful for callers
/// that want to tail negotiation output instead of driving a connection.
pub fn read_lines(stdout: ChildStdout) -> impl futures_core::Stream<Item = io::Result<String>> {
    let reader = BufReader::new(stdout);

    futures_util::stream::unfold(reader, |mut reader| async {
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                let mut line = String::from_utf8_lossy(&buf).into_owned();
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Some((Ok(line), reader))
            }
            Err(e) => Some((Err(e), reader)),
        }
    })
}
