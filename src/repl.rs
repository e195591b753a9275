//! Interactive command loop.
//!
//! The loop is synchronous and reads through a [`Prompter`]; runs are
//! driven on the tokio runtime through a [`Handle`]. Every failure inside a
//! command is reported and the loop keeps going.

use crate::command::{Instruction, parse_instruction};
use crate::errors::StoreError;
use crate::runner::Runner;
use console::Term;
use dialoguer::Input;
use std::io::{self, BufRead, IsTerminal, Write};
use tokio::runtime::Handle;
use tracing::{debug, error};

const PHRASE_QUESTION: &str = "Phrase (e.g., Scrape Program)";
const PATH_QUESTION: &str = "Full path to script (e.g., ~/scripts/scrape.py)";

/// Source of command lines and answers to follow-up questions.
///
/// `Ok(None)` means the user is gone (EOF or Ctrl+C at the prompt).
pub trait Prompter {
    fn read_command(&mut self) -> io::Result<Option<String>>;
    fn ask(&mut self, question: &str) -> io::Result<Option<String>>;
}

/// Prompter for an interactive terminal.
pub struct TerminalPrompter {
    term: Term,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn read_command(&mut self) -> io::Result<Option<String>> {
        self.term.write_str("> ")?;
        self.term.flush()?;
        match self.term.read_line() {
            Ok(line) => Ok(Some(line)),
            Err(err) if is_hangup(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        let answer = Input::<String>::new()
            .with_prompt(question)
            .allow_empty(true)
            .interact_text_on(&self.term);
        match answer {
            Ok(text) => Ok(Some(text)),
            Err(dialoguer::Error::IO(err)) if is_hangup(&err) => Ok(None),
            Err(err) => Err(io::Error::other(err)),
        }
    }
}

/// Prompter over any buffered reader. Used when stdin is not a terminal.
pub struct PipedPrompter<R> {
    reader: R,
    show_prompts: bool,
}

impl<R: BufRead> PipedPrompter<R> {
    pub fn new(reader: R, show_prompts: bool) -> Self {
        Self {
            reader,
            show_prompts,
        }
    }

    fn next_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        if self.show_prompts {
            let mut out = io::stdout().lock();
            write!(out, "{prompt}")?;
            out.flush()?;
        }
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl<R: BufRead> Prompter for PipedPrompter<R> {
    fn read_command(&mut self) -> io::Result<Option<String>> {
        self.next_line("> ")
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        self.next_line(&format!("{question}: "))
    }
}

/// Prompter for the process's stdin. Create it on the thread that reads.
pub fn stdin_prompter() -> Box<dyn Prompter> {
    if io::stdin().is_terminal() {
        Box::new(TerminalPrompter::new())
    } else {
        Box::new(PipedPrompter::new(io::stdin().lock(), true))
    }
}

fn is_hangup(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::UnexpectedEof
    )
}

pub fn help_text() -> String {
    textwrap::dedent(
        r#"
        Commands:
          map "<phrase>" <path>     Register a phrase for a script (no arguments: prompts)
          unmap "<phrase>"          Remove a mapping (exact phrase, else closest match)
          list                      Show all mappings
          run <phrase>              Launch the script a phrase matches, streaming its output
          run <phrase> &            Launch it in the background and return at once
          help                      Show this help
          exit | quit | :q          Leave

        Phrases are matched loosely: case, articles ("the", "a", "an") and
        filler words ("program", "script", "app") are ignored, so
        'run the scrape' finds 'Scrape Program'.
        "#,
    )
    .trim()
    .to_string()
}

/// Whether the loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Run the loop until `exit` or end of input.
pub fn run_loop(runner: &Runner, prompter: &mut dyn Prompter, rt: &Handle) -> io::Result<()> {
    runner.report("Phrase→Script Runner (type 'help' for commands)");
    runner.report(&format!("Config file: {}", runner.aliases().location()));

    loop {
        let Some(line) = prompter.read_command()? else {
            runner.report("bye.");
            return Ok(());
        };
        debug!(line = %line, "repl input");
        if execute(runner, parse_instruction(&line), prompter, rt) == Flow::Exit {
            runner.report("bye.");
            return Ok(());
        }
    }
}

/// Execute one instruction.
pub fn execute(
    runner: &Runner,
    instruction: Instruction,
    prompter: &mut dyn Prompter,
    rt: &Handle,
) -> Flow {
    let result = match instruction {
        Instruction::Empty => Ok(()),
        Instruction::Exit => return Flow::Exit,
        Instruction::Help => {
            runner.report(&help_text());
            Ok(())
        }
        Instruction::List => runner.list(),
        Instruction::Map(args) => map_command(runner, &args, prompter),
        Instruction::Unmap(args) => match args.as_slice() {
            [phrase, ..] => runner.unmap(phrase).map(|_| ()),
            [] => {
                runner.report("[err] Usage: unmap \"<phrase>\"");
                Ok(())
            }
        },
        Instruction::Run(rest) => {
            rt.block_on(runner.run_text(&rest));
            Ok(())
        }
        Instruction::Unknown(cmd) => {
            runner.report(&format!("[??] Unknown command: '{cmd}' — try 'help'"));
            Ok(())
        }
    };
    if let Err(err) = result {
        error!(error = %err, "command failed");
        runner.report(&format!("[err] {err}"));
    }
    Flow::Continue
}

fn map_command(
    runner: &Runner,
    args: &[String],
    prompter: &mut dyn Prompter,
) -> Result<(), StoreError> {
    match args {
        [] => map_interactive(runner, None, None, prompter).map(|_| ()),
        [phrase, path, ..] => runner.map(phrase, path).map(|_| ()),
        [_] => {
            runner.report("[err] Usage: map \"<phrase>\" <path>");
            Ok(())
        }
    }
}

/// Map a phrase to a script, asking for whichever of the two is missing.
///
/// Returns `Ok(true)` when the mapping was stored.
pub fn map_interactive(
    runner: &Runner,
    phrase: Option<&str>,
    path: Option<&str>,
    prompter: &mut dyn Prompter,
) -> Result<bool, StoreError> {
    let phrase = match phrase {
        Some(phrase) => Some(phrase.to_string()),
        None => ask_trimmed(prompter, PHRASE_QUESTION),
    };
    let path = match path {
        Some(path) => Some(path.to_string()),
        None => ask_trimmed(prompter, PATH_QUESTION),
    };
    match (phrase, path) {
        (Some(phrase), Some(path)) => runner.map(&phrase, &path),
        _ => {
            runner.report("[err] Phrase and path are required.");
            Ok(false)
        }
    }
}

fn ask_trimmed(prompter: &mut dyn Prompter, question: &str) -> Option<String> {
    match prompter.ask(question) {
        Ok(answer) => answer
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()),
        Err(err) => {
            debug!(error = %err, "prompt failed");
            None
        }
    }
}
