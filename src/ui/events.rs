use crate::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
#[cfg(test)]
use std::collections::VecDeque;
use std::time::Duration;

/// Everything the keyboard can ask the player to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    PauseResume,
    SeekBackward,
    SeekForward,
    /// digit pressed, 0-9
    Position(u8),
    VolumeUp,
    VolumeDown,
    ToggleMute,
    Stop,
    Skip,
    Next,
    Previous,
    Quit,
}

/// Bounded-wait key input. Never blocks longer than `timeout`.
pub trait KeySource {
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<Key>>;
}

/// Reads the real terminal. Expects raw mode to be enabled by the caller.
#[derive(Default)]
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<Key>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(map_key(key)),
            _ => Ok(None),
        }
    }
}

pub fn map_key(key: KeyEvent) -> Option<Key> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        // raw mode delivers ^\ as ctrl+4 on most terminals
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('C') | KeyCode::Char('\\') | KeyCode::Char('4') => {
                Some(Key::Quit)
            }
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char(' ') => Some(Key::PauseResume),
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            'j' => Some(Key::SeekBackward),
            'l' => Some(Key::SeekForward),
            'q' | '+' | '=' => Some(Key::VolumeUp),
            'a' | '-' | '_' => Some(Key::VolumeDown),
            'm' => Some(Key::ToggleMute),
            's' => Some(Key::Stop),
            'x' => Some(Key::Skip),
            'n' => Some(Key::Next),
            'p' => Some(Key::Previous),
            d @ '0'..='9' => Some(Key::Position(d as u8 - b'0')),
            _ => None,
        },
        _ => None,
    }
}

/// Key source for running without a terminal (service mode): waits out the
/// timeout so the tick rate stays the same, and never reports a key.
#[derive(Default)]
pub struct NoKeys;

impl KeySource for NoKeys {
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<Key>> {
        std::thread::sleep(timeout);
        Ok(None)
    }
}

/// Canned key presses for driving the player in tests.
/// Each poll yields the next scripted entry; `None` entries are idle ticks.
/// Once the script runs out it keeps answering `Quit`.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedKeys {
    script: VecDeque<Option<Key>>,
}

#[cfg(test)]
impl ScriptedKeys {
    pub fn new<I: IntoIterator<Item = Option<Key>>>(script: I) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

#[cfg(test)]
impl KeySource for ScriptedKeys {
    fn poll_key(&mut self, _timeout: Duration) -> Result<Option<Key>> {
        Ok(self.script.pop_front().unwrap_or(Some(Key::Quit)))
    }
}
