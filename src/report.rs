//! Operator-facing output.
//!
//! Everything the user is meant to read (status tags, drained child output)
//! goes through a [`Reporter`]; diagnostics go through `tracing` instead.

use console::style;
use std::sync::Mutex;

/// Sink for user-facing lines. Each call emits one whole line.
pub trait Reporter: Send + Sync {
    fn emit(&self, line: &str);
}

/// Prints to stdout, colouring the leading status tag on terminals.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn emit(&self, line: &str) {
        println!("{}", stylize(line));
    }
}

fn stylize(line: &str) -> String {
    let Some(end) = line.find(']').filter(|_| line.starts_with('[')) else {
        return line.to_string();
    };
    let (tag, rest) = line.split_at(end + 1);
    let styled = match tag {
        "[ok]" => style(tag).green().to_string(),
        "[err]" | "[??]" => style(tag).red().to_string(),
        "[warn]" => style(tag).yellow().to_string(),
        "[bg]" => style(tag).cyan().to_string(),
        "[info]" | "[voice]" => style(tag).dim().to_string(),
        _ => return line.to_string(),
    };
    format!("{styled}{rest}")
}

/// Collects lines in memory. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct BufferReporter {
    lines: Mutex<Vec<String>>,
}

impl BufferReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl Reporter for BufferReporter {
    fn emit(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
