// Terminal side of deck: raw-mode keys while spinning, the status line,
// and the read-only listings the control commands print.

pub mod events;
pub mod listing;
pub mod status;

pub use events::{Key, KeySource, NoKeys, TerminalKeys};
pub use status::{Spinner, StatusView};

use crate::Result;
use crossterm::{
    cursor, execute, queue,
    terminal::{self, disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use std::io::{self, Write};

/// Keeps the terminal in raw mode for as long as it lives. No alternate
/// screen: the status line and messages stay in the scrollback.
pub struct TerminalManager {
    _cleanup_guard: CleanupGuard,
}

struct CleanupGuard;

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(stdout, cursor::Show);
        // leave the prompt below the last status line
        let _ = write!(stdout, "\r\n");
        let _ = stdout.flush();
    }
}

impl TerminalManager {
    pub fn new() -> Result<Self> {
        // Ensure clean terminal state first
        let _ = disable_raw_mode();
        enable_raw_mode()?;
        execute!(io::stdout(), cursor::Hide)?;
        Ok(Self {
            _cleanup_guard: CleanupGuard,
        })
    }
}

/// Where the player writes what the user sees.
pub trait Console {
    /// A full line that stays in the scrollback.
    fn line(&mut self, text: &str);
    /// Redraw the status line in place.
    fn status(&mut self, text: &str);
    /// A user-visible error, on its own line.
    fn error(&mut self, text: &str);
    fn width(&self) -> u16;
}

#[derive(Default)]
pub struct TerminalConsole;

impl TerminalConsole {
    pub fn new() -> Self {
        Self
    }

    fn write_line(text: &str) {
        let mut stdout = io::stdout();
        // raw mode: no implicit carriage return
        let _ = queue!(stdout, Clear(ClearType::CurrentLine));
        let _ = write!(stdout, "\r{text}\r\n");
        let _ = stdout.flush();
    }
}

impl Console for TerminalConsole {
    fn line(&mut self, text: &str) {
        Self::write_line(text);
    }

    fn status(&mut self, text: &str) {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "\r{text}");
        let _ = queue!(stdout, Clear(ClearType::UntilNewLine));
        let _ = stdout.flush();
    }

    fn error(&mut self, text: &str) {
        Self::write_line(&format!("** {text}"));
    }

    fn width(&self) -> u16 {
        terminal::size().map(|(w, _)| w).unwrap_or(80)
    }
}

/// Console that remembers everything, for asserting on player output.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingConsole {
    pub output: std::sync::Arc<std::sync::Mutex<Recorded>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct Recorded {
    pub lines: Vec<String>,
    pub errors: Vec<String>,
    pub last_status: Option<String>,
}

#[cfg(test)]
impl Console for RecordingConsole {
    fn line(&mut self, text: &str) {
        self.output.lock().unwrap().lines.push(text.to_string());
    }

    fn status(&mut self, text: &str) {
        self.output.lock().unwrap().last_status = Some(text.to_string());
    }

    fn error(&mut self, text: &str) {
        self.output.lock().unwrap().errors.push(text.to_string());
    }

    fn width(&self) -> u16 {
        80
    }
}
