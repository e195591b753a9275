//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled              |
//! |-----------|-------------------------------|
//! | `aliases` | `Map`, `Unmap`, `List`        |
//! | `run`     | `Run`                         |
//! | `repl`    | no subcommand, `Listen`       |
//!
//! Handlers return the process exit code.

pub mod aliases;
pub mod repl;
pub mod run;

pub use aliases::{cmd_list, cmd_map, cmd_unmap};
pub use repl::{cmd_listen, cmd_repl};
pub use run::cmd_run;

use anyhow::{Context, Result};
use phrase_runner::config::RunnerConfig;
use phrase_runner::report::{ConsoleReporter, Reporter};
use phrase_runner::runner::Runner;
use phrase_runner::store::{JsonFileStore, LoadStatus, SharedAliases};
use phrase_runner::supervisor::Supervisor;
use std::sync::Arc;

/// Load the alias table and wire up the runner every command shares.
///
/// A corrupt alias file is reported and replaced by an empty table in
/// memory; the file itself is left alone until the next save.
pub fn build_runner(config: &RunnerConfig) -> Result<Arc<Runner>> {
    let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter);
    let store = JsonFileStore::new(&config.alias_file);
    let (aliases, status) = SharedAliases::open(Box::new(store))
        .with_context(|| format!("Failed to load {}", config.alias_file.display()))?;
    if let LoadStatus::Corrupt(err) = status {
        tracing::warn!(error = %err, "alias file is corrupt");
        reporter.emit(&format!(
            "[warn] Failed to parse {}. Starting with empty mapping.",
            config.alias_file.display()
        ));
    }

    let supervisor = Supervisor::new(config.launch.clone(), Arc::clone(&reporter));
    Ok(Arc::new(Runner::new(aliases, supervisor, reporter)))
}
