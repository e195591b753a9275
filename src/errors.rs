//! Typed error hierarchy for the phrase runner.
//!
//! Three subsystem enums, plus `DispatchError` which wraps a failed `run`:
//! - `ValidationError`: rejected registrations (`map`)
//! - `SupervisorError`: launch-time failures, including spawn failures
//! - `StoreError`: alias file I/O and corruption
//!
//! A phrase that resolves to nothing is not an error; it is reported
//! through `runner::RunOutcome::NoMatch`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while registering a phrase → script mapping.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Phrase must not be empty")]
    EmptyPhrase,

    #[error("Script path must not be empty")]
    EmptyPath,

    #[error("Script not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Expected a file, got directory: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("Expected a regular file: {}", .0.display())]
    NotRegularFile(PathBuf),
}

/// Errors from launching a script.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("Expected a file, got directory: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Interpreter '{interpreter}' could not be located: {source}")]
    InterpreterNotFound {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {}: {source}", .script.display())]
    SpawnFailed {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}

impl SupervisorError {
    /// True for the OS-level failures to create the child process.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(
            self,
            SupervisorError::InterpreterNotFound { .. } | SupervisorError::SpawnFailed { .. }
        )
    }
}

/// Errors from the persisted alias store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to parse {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode alias table for {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Alias file I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Alias table lock poisoned")]
    LockPoisoned,
}

/// Hard failures of a single `run` request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
