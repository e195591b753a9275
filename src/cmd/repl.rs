//! Interactive session and the utterance listener.

use anyhow::{Context, Result};
use phrase_runner::repl::{run_loop, stdin_prompter};
use phrase_runner::runner::Runner;
use phrase_runner::voice::spawn_listener;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Run the REPL on stdin. With `utterances`, decoded speech from that
/// source is dispatched concurrently through the same runner.
pub async fn cmd_repl(runner: Arc<Runner>, utterances: Option<PathBuf>) -> Result<u8> {
    let listener = utterances.map(|source| spawn_listener(source, Arc::clone(&runner)));

    let rt = Handle::current();
    let repl_runner = Arc::clone(&runner);
    tokio::task::spawn_blocking(move || {
        let mut prompter = stdin_prompter();
        run_loop(&repl_runner, prompter.as_mut(), &rt)
    })
    .await
    .context("REPL thread panicked")?
    .context("Failed to read input")?;

    if let Some(listener) = listener {
        listener.abort();
    }
    Ok(0)
}

/// Dispatch utterances from `source` until it reaches end of file.
pub async fn cmd_listen(runner: Arc<Runner>, source: PathBuf) -> Result<u8> {
    if !source.exists() {
        anyhow::bail!("Utterance source not found: {}", source.display());
    }
    spawn_listener(source, runner)
        .await
        .context("Utterance listener panicked")?;
    Ok(0)
}
