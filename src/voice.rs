//! Speech-derived instructions.
//!
//! Recognition itself happens elsewhere: an external recognizer writes one
//! decoded utterance per line to a file or FIFO, and [`spawn_listener`]
//! feeds those utterances through the same run path as typed commands.

use crate::command::RunRequest;
use crate::runner::Runner;
use crate::supervisor::LaunchMode;
use regex::Regex;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

static RUN_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brun\s+(.+)$").expect("valid run segment pattern"));

static BACKGROUND_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)(?:and|ampersand|background)$").expect("valid background pattern")
});

const UTTERANCE_QUEUE: usize = 16;

/// Turn a decoded utterance into a run request.
///
/// Only the text after the first standalone "run" counts. A trailing "and",
/// "ampersand" or "background" (what "&" sounds like) selects a detached
/// launch and is dropped from the phrase. Returns `None` when the utterance
/// holds no run instruction.
pub fn interpret_utterance(text: &str) -> Option<RunRequest> {
    let text = text.trim();
    let segment = RUN_SEGMENT.captures(text)?.get(1)?.as_str().trim();

    let (phrase, mode) = match BACKGROUND_SUFFIX.find(segment) {
        Some(m) => (segment[..m.start()].trim(), LaunchMode::Detached),
        None => (segment, LaunchMode::Attached),
    };
    Some(RunRequest {
        phrase: phrase.to_string(),
        mode,
    })
}

/// Read utterances from `source` on a dedicated thread and dispatch each one
/// through `runner`, one at a time.
///
/// The reader thread is a plain OS thread so a blocked FIFO read never holds
/// up runtime shutdown. The returned task ends when the source hits EOF.
pub fn spawn_listener(source: PathBuf, runner: Arc<Runner>) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel::<String>(UTTERANCE_QUEUE);

    let reader_source = source.clone();
    let spawned = std::thread::Builder::new()
        .name("utterances".to_string())
        .spawn(move || read_utterances(&reader_source, &tx));
    if let Err(err) = spawned {
        warn!(error = %err, "failed to start utterance reader");
    }

    tokio::spawn(async move {
        runner.report(&format!(
            "[voice] Listening on {}... say something like: 'run scrape program'",
            source.display()
        ));
        while let Some(text) = rx.recv().await {
            handle_utterance(&runner, &text).await;
        }
        debug!(source = %source.display(), "utterance source closed");
    })
}

fn read_utterances(source: &std::path::Path, tx: &mpsc::Sender<String>) {
    let file = match std::fs::File::open(source) {
        Ok(file) => file,
        Err(err) => {
            warn!(source = %source.display(), error = %err, "cannot open utterance source");
            return;
        }
    };
    for line in std::io::BufReader::new(file).lines() {
        let text = match line {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "utterance read failed");
                break;
            }
        };
        if text.trim().is_empty() {
            continue;
        }
        if tx.blocking_send(text).is_err() {
            break;
        }
    }
}

/// Dispatch one utterance. Failures are reported and swallowed so the
/// listener keeps running.
pub async fn handle_utterance(runner: &Runner, text: &str) {
    let Some(request) = interpret_utterance(text) else {
        debug!(text, "utterance without run instruction");
        return;
    };
    let bg = if request.mode == LaunchMode::Detached {
        " (bg)"
    } else {
        ""
    };
    runner.report(&format!(
        "[voice] heard: '{text}' → interpreted phrase: '{}'{bg}",
        request.phrase
    ));
    runner.run_and_report(&request).await;
}
