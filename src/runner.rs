//! Dispatch service behind every front end.
//!
//! The REPL, the one-shot subcommands and the utterance listener all call
//! into one [`Runner`]. It owns the shared alias table, the supervisor and
//! the reporter, and turns outcomes into the user-facing status lines.

use crate::alias::validate_script_path;
use crate::command::{RunRequest, parse_run_command};
use crate::errors::{DispatchError, StoreError, SupervisorError};
use crate::report::Reporter;
use crate::store::{Removal, SharedAliases};
use crate::supervisor::{ProcessHandle, Supervisor};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Result of a run request that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Launched(ProcessHandle),
    /// The phrase resolved to nothing. Not an error.
    NoMatch { phrase: String },
    /// The request carried no phrase at all.
    Nothing,
}

pub struct Runner {
    aliases: SharedAliases,
    supervisor: Supervisor,
    reporter: Arc<dyn Reporter>,
}

impl Runner {
    pub fn new(aliases: SharedAliases, supervisor: Supervisor, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            aliases,
            supervisor,
            reporter,
        }
    }

    pub fn aliases(&self) -> &SharedAliases {
        &self.aliases
    }

    pub fn report(&self, line: &str) {
        self.reporter.emit(line);
    }

    /// Validate `raw_path` and register `phrase` for it.
    ///
    /// Returns `Ok(true)` when the mapping was stored. Validation failures
    /// are reported and leave the table unchanged.
    pub fn map(&self, phrase: &str, raw_path: &str) -> Result<bool, StoreError> {
        let settings = self.supervisor.settings();
        let script = match validate_script_path(raw_path, &settings.script_extension) {
            Ok(script) => script,
            Err(err) => {
                self.report(&format!("[err] {err}"));
                return Ok(false);
            }
        };
        if !script.extension_matches {
            self.report(&format!(
                "[warn] '{}' does not end with .{}; attempting to run with {} anyway.",
                script.path.display(),
                settings.script_extension,
                settings.interpreter
            ));
        }

        let path = script.path.to_string_lossy();
        match self.aliases.map(phrase, &path)? {
            Ok(()) => {
                info!(phrase, path = %path, "mapping registered");
                self.report(&format!("[ok] Mapped '{phrase}' → {path}"));
                Ok(true)
            }
            Err(err) => {
                self.report(&format!("[err] {err}"));
                Ok(false)
            }
        }
    }

    /// Remove a mapping by exact phrase, else by the phrase it resolves to.
    pub fn unmap(&self, phrase: &str) -> Result<Removal, StoreError> {
        let removal = self.aliases.unmap(phrase)?;
        match &removal {
            Removal::Exact(key) | Removal::Resolved(key) => {
                info!(requested = phrase, removed = %key, "mapping removed");
                self.report(&format!("[ok] Removed mapping '{key}'"));
            }
            Removal::NotFound => {
                self.report(&format!("[warn] No mapping found for '{phrase}'"));
            }
        }
        Ok(removal)
    }

    /// Print every mapping, phrases padded to the widest, sorted
    /// case-insensitively.
    pub fn list(&self) -> Result<(), StoreError> {
        let table = self.aliases.snapshot()?;
        if table.is_empty() {
            self.report("(no mappings yet) Use: map \"<phrase>\" <path>");
            return Ok(());
        }
        let width = table.widest_phrase();
        for entry in table.sorted_for_display() {
            self.report(&format!("{:<width$}  ->  {}", entry.phrase, entry.path));
        }
        Ok(())
    }

    /// Resolve the request's phrase and launch the script it maps to.
    pub async fn run(&self, request: &RunRequest) -> Result<RunOutcome, DispatchError> {
        let phrase = request.phrase.trim();
        if phrase.is_empty() {
            return Ok(RunOutcome::Nothing);
        }
        let Some(target) = self.aliases.resolve(phrase)? else {
            return Ok(RunOutcome::NoMatch {
                phrase: phrase.to_string(),
            });
        };

        self.report(&format!(
            "[info] Launching '{}' → {}",
            target.matched_phrase, target.path
        ));
        let handle = self
            .supervisor
            .launch(Path::new(&target.path), request.mode)
            .await?;
        Ok(RunOutcome::Launched(handle))
    }

    /// [`Runner::run`], with every outcome and failure turned into a status
    /// line. Returns the handle when something was launched.
    pub async fn run_and_report(&self, request: &RunRequest) -> Option<ProcessHandle> {
        match self.run(request).await {
            Ok(RunOutcome::Launched(handle)) => Some(handle),
            Ok(RunOutcome::Nothing) => {
                self.report("[err] Nothing to run. Try: run <phrase>");
                None
            }
            Ok(RunOutcome::NoMatch { phrase }) => {
                self.report(&format!(
                    "[warn] No mapping matched '{phrase}'. Use 'list' to see options or 'map' to add one."
                ));
                None
            }
            Err(DispatchError::Supervisor(err @ SupervisorError::ScriptNotFound(_))) => {
                error!(error = %err, "script vanished since it was mapped");
                self.report(&format!("[err] {err}"));
                None
            }
            Err(err) => {
                error!(error = %err, phrase = %request.phrase, "run failed");
                self.report(&format!("[err] Failed to run: {err}"));
                None
            }
        }
    }

    /// Parse the text after `run` and dispatch it.
    pub async fn run_text(&self, rest: &str) -> Option<ProcessHandle> {
        self.run_and_report(&parse_run_command(rest)).await
    }
}
