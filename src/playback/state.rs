// Player state: the in-process cell shared with the pipeline callback,
// and the persisted copies other processes read from the store.

use crate::audio::{MessageHandler, PipelineMessage, PipelineState, Track};
use crate::store::{keys, SharedStore};
use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
    Paused,
    SeekingForward,
    SeekingBackward,
    Stopped,
    Skipped,
    Previous,
    Ended,
}

impl PlayerState {
    /// Name written to the `state` key. Loading is never persisted.
    pub fn stored_name(&self) -> Option<&'static str> {
        match self {
            PlayerState::Idle | PlayerState::Ended => Some("null"),
            PlayerState::Loading => None,
            PlayerState::Playing => Some("playing"),
            PlayerState::Paused => Some("paused"),
            PlayerState::SeekingForward => Some("seek_forwards"),
            PlayerState::SeekingBackward => Some("seek_backwards"),
            PlayerState::Stopped => Some("stopped"),
            PlayerState::Skipped => Some("skipped"),
            PlayerState::Previous => Some("previous"),
        }
    }

    pub fn from_stored(name: &str) -> Result<Self> {
        Ok(match name {
            "null" => PlayerState::Idle,
            "playing" => PlayerState::Playing,
            "paused" => PlayerState::Paused,
            "seek_forwards" => PlayerState::SeekingForward,
            "seek_backwards" => PlayerState::SeekingBackward,
            "stopped" => PlayerState::Stopped,
            "skipped" => PlayerState::Skipped,
            "previous" => PlayerState::Previous,
            other => return Err(Error::UnknownState(other.to_string())),
        })
    }

    /// States that end the per-track loop
    pub fn ends_track(&self) -> bool {
        matches!(
            self,
            PlayerState::Stopped | PlayerState::Skipped | PlayerState::Previous | PlayerState::Ended
        )
    }

    pub fn is_audible(&self) -> bool {
        matches!(
            self,
            PlayerState::Playing | PlayerState::SeekingForward | PlayerState::SeekingBackward
        )
    }

    /// Status glyph; None means "show the spinner"
    pub fn glyph(&self) -> Option<char> {
        match self {
            PlayerState::Playing => Some('▶'),
            PlayerState::Paused => Some('‖'),
            PlayerState::SeekingForward => Some('→'),
            PlayerState::SeekingBackward => Some('←'),
            PlayerState::Stopped => Some('◼'),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Cell {
    state: PlayerState,
    pending_error: Option<String>,
}

/// Mutex-guarded state shared between the playback loop and the pipeline
/// callback. The loop owns user and command transitions; the callback can
/// only report what the pipeline did.
#[derive(Clone)]
pub struct StateCell {
    inner: Arc<Mutex<Cell>>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cell {
                state: PlayerState::Idle,
                pending_error: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cell> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> PlayerState {
        self.lock().state
    }

    pub fn set(&self, state: PlayerState) {
        self.lock().state = state;
    }

    /// Error text raised by the pipeline since the last call
    pub fn take_error(&self) -> Option<String> {
        self.lock().pending_error.take()
    }

    pub fn apply_pipeline(&self, message: PipelineMessage) {
        let mut cell = self.lock();
        match message {
            PipelineMessage::StateChanged(reported) => {
                if cell.state.ends_track() {
                    return;
                }
                match reported {
                    PipelineState::Playing => cell.state = PlayerState::Playing,
                    PipelineState::Paused => cell.state = PlayerState::Paused,
                    // teardown is always the loop's own doing
                    PipelineState::Null => {}
                }
            }
            PipelineMessage::EndOfStream => {
                debug!("End of stream");
                if !cell.state.ends_track() {
                    cell.state = PlayerState::Ended;
                }
            }
            PipelineMessage::Error {
                message,
                debug: detail,
            } => {
                warn!("Pipeline error: {} ({:?})", message, detail);
                if !cell.state.ends_track() {
                    cell.state = PlayerState::Ended;
                }
                cell.pending_error = Some(match detail {
                    Some(detail) => format!("error \"{message}\" \"{detail}\""),
                    None => format!("error \"{message}\""),
                });
            }
            PipelineMessage::Ignorable(_) => {}
            PipelineMessage::Unknown(kind) => {
                cell.pending_error = Some(format!("unknown message type \"{kind}\""));
            }
        }
    }

    pub fn handler(&self) -> MessageHandler {
        let cell = self.clone();
        Arc::new(move |message: PipelineMessage| cell.apply_pipeline(message))
    }
}

/// The persisted player keys: state, current_track, volume, muted.
#[derive(Clone)]
pub struct StateStore {
    store: SharedStore,
}

impl StateStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn persist_state(&self, state: PlayerState) -> Result<()> {
        match state.stored_name() {
            Some(name) => self.store.set(keys::STATE, name),
            None => Ok(()),
        }
    }

    pub fn stored_state(&self) -> Result<Option<PlayerState>> {
        self.store
            .get(keys::STATE)?
            .map(|name| PlayerState::from_stored(&name))
            .transpose()
    }

    pub fn current_track(&self) -> Result<Option<Track>> {
        self.store
            .get(keys::CURRENT_TRACK)?
            .map(|record| Track::from_record(&record))
            .transpose()
    }

    pub fn set_current_track(&self, track: &Track) -> Result<()> {
        self.store.set(keys::CURRENT_TRACK, &track.to_record()?)
    }

    pub fn clear_current_track(&self) -> Result<()> {
        self.store.delete(keys::CURRENT_TRACK)?;
        Ok(())
    }

    /// Atomically remove and return the raw current_track record
    pub fn take_current_record(&self) -> Result<Option<String>> {
        self.store.get_del(keys::CURRENT_TRACK)
    }

    pub fn volume(&self) -> Result<Option<i64>> {
        Ok(self.store.get(keys::VOLUME)?.and_then(|raw| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .map(|v| (v as i64).clamp(0, 1000))
        }))
    }

    pub fn set_volume(&self, volume: i64) -> Result<()> {
        self.store.set(keys::VOLUME, &volume.clamp(0, 1000).to_string())
    }

    pub fn muted(&self) -> Result<Option<bool>> {
        Ok(self
            .store
            .get(keys::MUTED)?
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|v| v == 1))
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.store.set(keys::MUTED, if muted { "1" } else { "0" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_names() {
        assert_eq!(PlayerState::Idle.stored_name(), Some("null"));
        assert_eq!(PlayerState::Ended.stored_name(), Some("null"));
        assert_eq!(PlayerState::Loading.stored_name(), None);
        assert_eq!(PlayerState::SeekingBackward.stored_name(), Some("seek_backwards"));
        for state in [
            PlayerState::Playing,
            PlayerState::Paused,
            PlayerState::SeekingForward,
            PlayerState::Stopped,
            PlayerState::Skipped,
            PlayerState::Previous,
        ] {
            let name = state.stored_name().unwrap();
            assert_eq!(PlayerState::from_stored(name).unwrap(), state);
        }
        assert!(matches!(
            PlayerState::from_stored("dancing"),
            Err(Error::UnknownState(_))
        ));
    }

    #[test]
    fn pipeline_cannot_undo_terminal_states() {
        let cell = StateCell::new();
        cell.set(PlayerState::Skipped);
        cell.apply_pipeline(PipelineMessage::StateChanged(PipelineState::Playing));
        cell.apply_pipeline(PipelineMessage::EndOfStream);
        assert_eq!(cell.get(), PlayerState::Skipped);
    }

    #[test]
    fn pipeline_reports_drive_live_states() {
        let cell = StateCell::new();
        cell.set(PlayerState::Loading);
        cell.apply_pipeline(PipelineMessage::StateChanged(PipelineState::Playing));
        assert_eq!(cell.get(), PlayerState::Playing);
        cell.apply_pipeline(PipelineMessage::Ignorable("latency"));
        cell.apply_pipeline(PipelineMessage::StateChanged(PipelineState::Null));
        assert_eq!(cell.get(), PlayerState::Playing);
        cell.apply_pipeline(PipelineMessage::EndOfStream);
        assert_eq!(cell.get(), PlayerState::Ended);
    }

    #[test]
    fn errors_end_the_track_and_surface() {
        let cell = StateCell::new();
        cell.set(PlayerState::Playing);
        (cell.handler())(PipelineMessage::Error {
            message: "decoder".into(),
            debug: Some("bad frame".into()),
        });
        assert_eq!(cell.get(), PlayerState::Ended);
        assert_eq!(cell.take_error().unwrap(), "error \"decoder\" \"bad frame\"");
        assert_eq!(cell.take_error(), None);

        cell.apply_pipeline(PipelineMessage::Unknown("qos".into()));
        assert_eq!(cell.take_error().unwrap(), "unknown message type \"qos\"");

        cell.apply_pipeline(PipelineMessage::Error {
            message: "sink gone".into(),
            debug: None,
        });
        assert_eq!(cell.take_error().unwrap(), "error \"sink gone\"");
    }

    #[test]
    fn persisted_keys() {
        let states = StateStore::new(SharedStore::in_memory("test"));
        assert_eq!(states.stored_state().unwrap(), None);
        states.persist_state(PlayerState::Paused).unwrap();
        states.persist_state(PlayerState::Loading).unwrap();
        assert_eq!(states.stored_state().unwrap(), Some(PlayerState::Paused));

        assert_eq!(states.volume().unwrap(), None);
        states.set_volume(1500).unwrap();
        assert_eq!(states.volume().unwrap(), Some(1000));
        states.set_muted(true).unwrap();
        assert_eq!(states.muted().unwrap(), Some(true));

        let track = Track::new("/music/a.mp3".into(), Default::default());
        states.set_current_track(&track).unwrap();
        assert_eq!(states.current_track().unwrap(), Some(track));
        assert!(states.take_current_record().unwrap().is_some());
        assert_eq!(states.current_track().unwrap(), None);
    }
}
