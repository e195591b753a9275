//! One-shot launch: `phrase-runner run <phrase...>`.

use phrase_runner::runner::Runner;
use phrase_runner::supervisor::LaunchResult;

/// Launch the script `words` match. An attached run exits with the child's
/// code; signal deaths map to `128 + signal` the way shells report them.
pub async fn cmd_run(runner: &Runner, words: &[String], background: bool) -> u8 {
    let mut text = words.join(" ");
    if background {
        text.push_str(" &");
    }

    match runner.run_text(&text).await.map(|handle| handle.result()) {
        Some(LaunchResult::ExitCode(code)) => shell_code(code),
        Some(LaunchResult::BackgroundPid(_)) => 0,
        None => 1,
    }
}

fn shell_code(code: i32) -> u8 {
    match code {
        0..=255 => code as u8,
        c if c < 0 => u8::try_from(128 - c).unwrap_or(255),
        _ => 1,
    }
}
