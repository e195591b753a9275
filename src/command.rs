//! Instruction parsing for the REPL and the one-shot CLI.

use crate::supervisor::LaunchMode;
use regex::Regex;
use std::sync::LazyLock;

static RUN_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^run\s+(.*)$").expect("valid run pattern"));

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Empty,
    Help,
    Exit,
    Map(Vec<String>),
    Unmap(Vec<String>),
    List,
    /// Everything after the `run` keyword, still unparsed.
    Run(String),
    Unknown(String),
}

/// A phrase to resolve plus the requested launch mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub phrase: String,
    pub mode: LaunchMode,
}

/// Classify a raw input line.
pub fn parse_instruction(raw: &str) -> Instruction {
    let raw = raw.trim();
    if raw.is_empty() {
        return Instruction::Empty;
    }
    let parts = split_args(raw);
    let Some(first) = parts.first() else {
        return Instruction::Empty;
    };
    let cmd = first.to_lowercase();
    let natural_run = raw.to_lowercase().starts_with("run ");

    match cmd.as_str() {
        "exit" | "quit" | ":q" => Instruction::Exit,
        "help" => Instruction::Help,
        "map" => Instruction::Map(parts[1..].to_vec()),
        "unmap" => Instruction::Unmap(parts[1..].to_vec()),
        "list" => Instruction::List,
        "run" => Instruction::Run(raw.get(4..).unwrap_or("").to_string()),
        _ if natural_run => Instruction::Run(raw.to_string()),
        _ => Instruction::Unknown(first.clone()),
    }
}

/// Split a command line into words, honouring single and double quotes and
/// backslash escapes. Unbalanced quotes fall back to whitespace splitting.
pub fn split_args(raw: &str) -> Vec<String> {
    shell_split(raw).unwrap_or_else(|| raw.split_whitespace().map(str::to_string).collect())
}

fn shell_split(raw: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        other => current.push(other),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => match chars.next()? {
                            escaped @ ('"' | '\\' | '$' | '`') => current.push(escaped),
                            other => {
                                current.push('\\');
                                current.push(other);
                            }
                        },
                        other => current.push(other),
                    }
                }
            }
            '\\' => {
                in_word = true;
                current.push(chars.next()?);
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}

/// Parse the text after `run`: a trailing `&` selects a detached launch, a
/// leading `run ` is dropped, and surrounding quotes are stripped.
pub fn parse_run_command(input: &str) -> RunRequest {
    let trimmed = input.trim();
    let (rest, mode) = match trimmed.strip_suffix('&') {
        Some(rest) => (rest.trim(), LaunchMode::Detached),
        None => (trimmed, LaunchMode::Attached),
    };
    let phrase = RUN_PREFIX
        .captures(rest)
        .and_then(|caps| caps.get(1))
        .map_or(rest, |m| m.as_str());
    let phrase = phrase.trim().trim_matches(|c| c == '"' || c == '\'');
    RunRequest {
        phrase: phrase.to_string(),
        mode,
    }
}
