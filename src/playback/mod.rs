// Playback coordination over the shared store: the queue, the command slot,
// the player state machine and startup recovery.

pub mod command;
pub mod player;
pub mod queue;
pub mod recovery;
pub mod state;

pub use command::{Command, CommandChannel};
pub use player::{Flow, Player, TrackExit, KEY_LEGEND};
pub use queue::QueueManager;
pub use recovery::{recover, restore_volume, RecoveryReport};
pub use state::{PlayerState, StateCell, StateStore};
