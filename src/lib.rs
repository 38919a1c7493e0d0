// deck library - everything behind the `deck` binary
// One long-running player, many short-lived controllers, one shared store between them

pub mod audio;    // tracks, tags, path expansion, the media pipeline
pub mod config;   // settings file
pub mod error;
pub mod logging;
pub mod nfc;      // tag scans switch playlists
pub mod playback; // queue, command slot, player state machine, recovery
pub mod scrobble; // now playing + finished plays to a listening service
pub mod store;    // namespaced key/value + list store
pub mod ui;       // raw-mode keys, status line, listings

pub use audio::{EnqueueMode, Track};
pub use config::Config;
pub use error::{Error, Result};
pub use playback::{Command, CommandChannel, Player, PlayerState, QueueManager};
pub use store::SharedStore;
