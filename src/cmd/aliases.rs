//! Alias table commands: `map`, `unmap` and `list`.

use anyhow::Result;
use phrase_runner::repl::{map_interactive, stdin_prompter};
use phrase_runner::runner::Runner;
use phrase_runner::store::Removal;

pub fn cmd_map(runner: &Runner, phrase: Option<&str>, path: Option<&str>) -> Result<u8> {
    let mapped = match (phrase, path) {
        (Some(phrase), Some(path)) => runner.map(phrase, path)?,
        _ => {
            let mut prompter = stdin_prompter();
            map_interactive(runner, phrase, path, prompter.as_mut())?
        }
    };
    Ok(if mapped { 0 } else { 1 })
}

pub fn cmd_unmap(runner: &Runner, phrase: &str) -> Result<u8> {
    Ok(match runner.unmap(phrase)? {
        Removal::NotFound => 1,
        Removal::Exact(_) | Removal::Resolved(_) => 0,
    })
}

pub fn cmd_list(runner: &Runner) -> Result<u8> {
    runner.list()?;
    Ok(0)
}
