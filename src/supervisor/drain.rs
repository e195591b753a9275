//! Output drain worker for attached launches.
//!
//! The worker runs on its own OS thread so a chatty child can never fill the
//! pipe while the supervisor is blocked waiting for exit.

use crate::report::Reporter;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Start draining `reader`, emitting `[<label>] <line>` for every line.
///
/// The returned receiver resolves with the number of lines once the pipe
/// hits EOF. If the thread cannot be started the receiver resolves with an
/// error immediately.
pub(crate) fn spawn_drain<R>(
    reader: R,
    label: String,
    reporter: Arc<dyn Reporter>,
) -> oneshot::Receiver<usize>
where
    R: Read + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name(format!("drain[{label}]"))
        .spawn(move || {
            let lines = drain_lines(reader, &label, reporter.as_ref());
            let _ = done_tx.send(lines);
        });
    if let Err(err) = spawned {
        warn!(error = %err, "failed to start output drain thread");
    }
    done_rx
}

/// Read `reader` to EOF line by line. Invalid UTF-8 is replaced, trailing
/// whitespace is dropped.
pub(crate) fn drain_lines<R: Read>(reader: R, label: &str, reporter: &dyn Reporter) -> usize {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut lines = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                reporter.emit(&format!("[{label}] {}", line.trim_end()));
                lines += 1;
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!(error = %err, label, "output pipe read failed");
                break;
            }
        }
    }
    lines
}
