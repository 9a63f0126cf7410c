use std::cell::Cell;
use std::io::{self, IsTerminal, Write};
use std::time::Instant;

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Single redrawn status line on stderr, e.g. `Progress: 42% phase=enrich; record 21/50`.
pub struct ConsoleProgress {
    started: Instant,
    redraw: bool,
    dirty: Cell<bool>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            redraw: io::stderr().is_terminal(),
            dirty: Cell::new(false),
        }
    }

    fn draw(&self, line: &str) -> io::Result<()> {
        let mut stderr = io::stderr();
        if self.redraw {
            stderr
                .queue(MoveToColumn(0))?
                .queue(Clear(ClearType::CurrentLine))?
                .queue(Print(line))?;
            self.dirty.set(true);
        } else {
            stderr.queue(Print(format!("{line}\n")))?;
        }
        stderr.flush()
    }

    /// Ends the status line and prints `(label, value)` rows as a summary.
    pub fn finish(&self, title: &str, rows: &[(&str, String)]) -> io::Result<()> {
        let mut stdout = io::stdout();
        if self.dirty.replace(false) {
            io::stderr().queue(Print("\n"))?.flush()?;
        }
        stdout
            .queue(SetForegroundColor(Color::Cyan))?
            .queue(Print(format!(
                "{title} ({:.1}s)\n",
                self.started.elapsed().as_secs_f64()
            )))?
            .queue(ResetColor)?;
        for (label, value) in rows {
            stdout
                .queue(SetForegroundColor(Color::Green))?
                .queue(Print(format!("  {label}: ")))?
                .queue(ResetColor)?
                .queue(Print(format!("{value}\n")))?;
        }
        stdout.flush()
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let line = match (event.percent(), event.elapsed) {
            (Some(percent), _) => format!("Progress: {percent:>3}% {}", event.message),
            (None, Some(elapsed)) => {
                format!("{} ({:.1}s)", event.message, elapsed.as_secs_f64())
            }
            (None, None) => event.message,
        };
        let _ = self.draw(&line);
    }
}
