// Error types shared by every deck module
// The binary wraps these in anyhow; library code returns deck::Result

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Shared store unavailable or a query failed. Always fatal to the caller.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A queued record could not be (de)serialized
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown command \"{0}\" received")]
    UnknownCommand(String),

    #[error("unknown player state \"{0}\"")]
    UnknownState(String),

    #[error("no file \"{}\"", .0.display())]
    MissingFile(PathBuf),

    #[error("unknown file type \"{}\"", .0.display())]
    UnsupportedFile(PathBuf),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("scrobble error: {0}")]
    Scrobble(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
