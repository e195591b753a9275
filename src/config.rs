//! Runtime configuration for the phrase runner.
//!
//! Configuration is built once at startup and handed to the command layer
//! and the supervisor; nothing reads it from globals. Values are layered,
//! lowest precedence first:
//!
//! 1. built-in defaults
//! 2. `runner.toml` (`--config <path>`, else `<config_dir>/phrase-runner/runner.toml`)
//! 3. environment (`PHRASE_RUNNER_ALIASES`, `PHRASE_RUNNER_INTERPRETER`)
//! 4. CLI flags
//!
//! # Configuration File Format
//!
//! ```toml
//! alias_file = "~/.script_aliases.json"
//!
//! [launch]
//! interpreter = "python3"
//! script_extension = "py"
//! drain_grace_ms = 500
//! interrupt_timeout_secs = 5
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alias::expand_home;

pub const ALIASES_ENV: &str = "PHRASE_RUNNER_ALIASES";
pub const INTERPRETER_ENV: &str = "PHRASE_RUNNER_INTERPRETER";

const DEFAULT_ALIAS_FILE: &str = ".script_aliases.json";
const DEFAULT_SCRIPT_EXTENSION: &str = "py";
const DEFAULT_DRAIN_GRACE_MS: u64 = 500;
const DEFAULT_INTERRUPT_TIMEOUT_SECS: u64 = 5;

#[cfg(windows)]
const DEFAULT_INTERPRETER: &str = "python";
#[cfg(not(windows))]
const DEFAULT_INTERPRETER: &str = "python3";

/// `[launch]` section of `runner.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchToml {
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default = "default_script_extension")]
    pub script_extension: String,
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
    #[serde(default = "default_interrupt_timeout_secs")]
    pub interrupt_timeout_secs: u64,
}

fn default_script_extension() -> String {
    DEFAULT_SCRIPT_EXTENSION.to_string()
}

fn default_drain_grace_ms() -> u64 {
    DEFAULT_DRAIN_GRACE_MS
}

fn default_interrupt_timeout_secs() -> u64 {
    DEFAULT_INTERRUPT_TIMEOUT_SECS
}

impl Default for LaunchToml {
    fn default() -> Self {
        Self {
            interpreter: None,
            script_extension: default_script_extension(),
            drain_grace_ms: default_drain_grace_ms(),
            interrupt_timeout_secs: default_interrupt_timeout_secs(),
        }
    }
}

/// Parsed `runner.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerToml {
    #[serde(default)]
    pub alias_file: Option<String>,
    #[serde(default)]
    pub launch: LaunchToml,
}

impl RunnerToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load `path` if it exists.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Default location: `<config_dir>/phrase-runner/runner.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("phrase-runner").join("runner.toml"))
    }
}

/// How the supervisor launches scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Executable that runs scripts (`<interpreter> <script>`).
    pub interpreter: String,
    /// Expected script extension; a mismatch only warns.
    pub script_extension: String,
    /// How long to wait for the drain worker after the child exits.
    pub drain_grace: Duration,
    /// How long an interrupted child gets before it is killed.
    pub interrupt_timeout: Duration,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            script_extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
            drain_grace: Duration::from_millis(DEFAULT_DRAIN_GRACE_MS),
            interrupt_timeout: Duration::from_secs(DEFAULT_INTERRUPT_TIMEOUT_SECS),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub alias_file: Option<PathBuf>,
    pub interpreter: Option<String>,
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub alias_file: PathBuf,
    pub launch: LaunchSettings,
}

impl RunnerConfig {
    /// Build the configuration from file, process environment and CLI.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let toml = match &cli.config {
            Some(path) => Some(RunnerToml::load(path)?),
            None => match RunnerToml::default_path() {
                Some(path) => RunnerToml::load_optional(&path)?,
                None => None,
            },
        };
        Self::from_layers(toml, |key| std::env::var(key).ok(), cli)
    }

    /// Layer an optional file, an environment lookup and CLI overrides.
    pub fn from_layers(
        toml: Option<RunnerToml>,
        env: impl Fn(&str) -> Option<String>,
        cli: &CliOverrides,
    ) -> Result<Self> {
        let toml = toml.unwrap_or_default();

        let alias_file = cli
            .alias_file
            .clone()
            .or_else(|| non_empty(env(ALIASES_ENV)).map(|p| expand_home(&p)))
            .or_else(|| toml.alias_file.as_deref().map(expand_home))
            .unwrap_or_else(default_alias_file);

        let interpreter = cli
            .interpreter
            .clone()
            .or_else(|| non_empty(env(INTERPRETER_ENV)))
            .or(toml.launch.interpreter)
            .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string());
        if interpreter.trim().is_empty() {
            anyhow::bail!("Interpreter must not be empty");
        }

        let script_extension = toml.launch.script_extension.trim_start_matches('.').to_string();
        if script_extension.is_empty() {
            anyhow::bail!("launch.script_extension must not be empty");
        }

        Ok(Self {
            alias_file,
            launch: LaunchSettings {
                interpreter,
                script_extension,
                drain_grace: Duration::from_millis(toml.launch.drain_grace_ms),
                interrupt_timeout: Duration::from_secs(toml.launch.interrupt_timeout_secs),
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_alias_file() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_ALIAS_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ALIAS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::from_layers(None, no_env, &CliOverrides::default()).unwrap();
        assert!(config.alias_file.ends_with(".script_aliases.json"));
        assert_eq!(config.launch, LaunchSettings::default());
        assert_eq!(config.launch.interrupt_timeout, Duration::from_secs(5));
        assert_eq!(config.launch.drain_grace, Duration::from_millis(500));
    }

    #[test]
    fn test_toml_layer() {
        let toml: RunnerToml = toml::from_str(
            r#"
            alias_file = "/data/aliases.json"

            [launch]
            interpreter = "pypy3"
            script_extension = ".PY"
            interrupt_timeout_secs = 2
            "#,
        )
        .unwrap();
        let config =
            RunnerConfig::from_layers(Some(toml), no_env, &CliOverrides::default()).unwrap();
        assert_eq!(config.alias_file, PathBuf::from("/data/aliases.json"));
        assert_eq!(config.launch.interpreter, "pypy3");
        assert_eq!(config.launch.script_extension, "PY");
        assert_eq!(config.launch.interrupt_timeout, Duration::from_secs(2));
        assert_eq!(config.launch.drain_grace, Duration::from_millis(500));
    }

    #[test]
    fn test_env_overrides_toml_and_cli_overrides_env() {
        let toml = RunnerToml {
            alias_file: Some("/from/toml.json".into()),
            launch: LaunchToml {
                interpreter: Some("toml-python".into()),
                ..LaunchToml::default()
            },
        };
        let env = |key: &str| match key {
            ALIASES_ENV => Some("/from/env.json".to_string()),
            INTERPRETER_ENV => Some("env-python".to_string()),
            _ => None,
        };

        let config =
            RunnerConfig::from_layers(Some(toml.clone()), env, &CliOverrides::default()).unwrap();
        assert_eq!(config.alias_file, PathBuf::from("/from/env.json"));
        assert_eq!(config.launch.interpreter, "env-python");

        let cli = CliOverrides {
            config: None,
            alias_file: Some(PathBuf::from("/from/cli.json")),
            interpreter: Some("sh".into()),
        };
        let config = RunnerConfig::from_layers(Some(toml), env, &cli).unwrap();
        assert_eq!(config.alias_file, PathBuf::from("/from/cli.json"));
        assert_eq!(config.launch.interpreter, "sh");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let env = |_: &str| Some("   ".to_string());
        let config = RunnerConfig::from_layers(None, env, &CliOverrides::default()).unwrap();
        assert_eq!(config.launch.interpreter, DEFAULT_INTERPRETER);
    }

    #[test]
    fn test_empty_extension_is_rejected() {
        let toml = RunnerToml {
            alias_file: None,
            launch: LaunchToml {
                script_extension: ".".into(),
                ..LaunchToml::default()
            },
        };
        assert!(RunnerConfig::from_layers(Some(toml), no_env, &CliOverrides::default()).is_err());
    }

    #[test]
    fn test_load_optional_and_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runner.toml");
        assert!(RunnerToml::load_optional(&path).unwrap().is_none());

        std::fs::write(&path, "launch = [not valid").unwrap();
        let err = RunnerToml::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
