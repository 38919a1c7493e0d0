use crate::store::{keys, SharedStore};
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// What a control process can ask the running player to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Next,
    Previous,
    Stop,
    Skip,
    Quit,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Pause => "pause",
            Command::Next => "next",
            Command::Previous => "previous",
            Command::Stop => "stop",
            Command::Skip => "skip",
            Command::Quit => "quit",
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pause" => Ok(Command::Pause),
            "next" => Ok(Command::Next),
            "previous" => Ok(Command::Previous),
            "stop" => Ok(Command::Stop),
            "skip" => Ok(Command::Skip),
            "quit" => Ok(Command::Quit),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-slot inbox. Senders overwrite, the player reads and deletes in one step,
/// so a command sent twice before the next tick is seen once.
#[derive(Clone)]
pub struct CommandChannel {
    store: SharedStore,
}

impl CommandChannel {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.store.set(keys::COMMAND, command.as_str())
    }

    /// `Ok(None)` when the slot is empty. An unrecognised value has already
    /// been removed by the time `Err(UnknownCommand)` comes back.
    pub fn poll_and_clear(&self) -> Result<Option<Command>> {
        match self.store.get_del(keys::COMMAND)? {
            Some(raw) => raw.parse().map(Some),
            None => Ok(None),
        }
    }
}
