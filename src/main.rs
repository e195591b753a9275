use anyhow::Result;
use clap::{Parser, Subcommand};
use phrase_runner::config::{CliOverrides, RunnerConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "phrase-runner")]
#[command(version, about = "Launch scripts by speaking or typing a phrase")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to runner.toml. Defaults to <config dir>/phrase-runner/runner.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Alias table location. Overrides runner.toml and PHRASE_RUNNER_ALIASES
    #[arg(long, global = true)]
    pub alias_file: Option<PathBuf>,

    /// Program that runs scripts. Overrides runner.toml and PHRASE_RUNNER_INTERPRETER
    #[arg(long, global = true)]
    pub interpreter: Option<String>,

    /// File or FIFO of decoded utterances, one per line, acted on alongside the REPL
    #[arg(long)]
    pub utterances: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a phrase for a script (prompts when arguments are missing)
    Map {
        phrase: Option<String>,
        path: Option<String>,
    },
    /// Remove a mapping by phrase
    Unmap { phrase: String },
    /// Show all mappings
    List,
    /// Launch the script a phrase matches
    Run {
        /// Start the script in the background and return at once
        #[arg(short, long)]
        background: bool,

        /// Phrase to match. A trailing `&` also selects the background
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        phrase: Vec<String>,
    },
    /// Act on decoded utterances from a file or FIFO until it closes
    Listen { source: PathBuf },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "phrase_runner=debug"
    } else {
        "phrase_runner=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = RunnerConfig::resolve(&CliOverrides {
        config: cli.config.clone(),
        alias_file: cli.alias_file.clone(),
        interpreter: cli.interpreter.clone(),
    })?;
    let runner = cmd::build_runner(&config)?;

    let code = match &cli.command {
        None => cmd::cmd_repl(runner, cli.utterances.clone()).await?,
        Some(Commands::Map { phrase, path }) => {
            cmd::cmd_map(&runner, phrase.as_deref(), path.as_deref())?
        }
        Some(Commands::Unmap { phrase }) => cmd::cmd_unmap(&runner, phrase)?,
        Some(Commands::List) => cmd::cmd_list(&runner)?,
        Some(Commands::Run { background, phrase }) => {
            cmd::cmd_run(&runner, phrase, *background).await
        }
        Some(Commands::Listen { source }) => cmd::cmd_listen(runner, source.clone()).await?,
    };

    Ok(ExitCode::from(code))
}
