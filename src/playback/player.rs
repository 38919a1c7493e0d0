// The playback loop and the per-track state machine.
// One fixed-interval tick: dequeue or idle, poll keys, poll the command slot, redraw.

use super::command::{Command, CommandChannel};
use super::queue::QueueManager;
use super::state::{PlayerState, StateCell, StateStore};
use crate::audio::{MediaPipeline, PipelineMessage, PipelineState, ScrobbleRecord, Track};
use crate::config::PlayerConfig;
use crate::store::SharedStore;
use crate::ui::{listing, status, Console, Key, KeySource, Spinner, StatusView};
use crate::{Error, Result};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const KEY_LEGEND: [&str; 3] = [
    "[Space]:pause/play  [L]:fast-fwd    [J]:rewind      [1234567890]:position",
    "[N]:next track      [P]:prev track  [X]:skip track  [S]:stop",
    "[Q/+]:vol up        [A/-]:vol down  [M]:mute        [^C]:quit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// How the per-track loop came to an end
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackExit {
    /// end of stream, pipeline error or `next`; `started` is epoch seconds
    Ended { started: f64 },
    Stopped,
    Skipped,
    Previous,
    Missing,
    Quit,
}

pub struct Player<P: MediaPipeline> {
    pipeline: P,
    queue: QueueManager,
    commands: CommandChannel,
    states: StateStore,
    cell: StateCell,
    keys: Box<dyn KeySource>,
    console: Box<dyn Console>,
    config: PlayerConfig,
    spinner: Spinner,
    current: Option<Track>,
}

impl<P: MediaPipeline> Player<P> {
    pub fn new(
        mut pipeline: P,
        store: SharedStore,
        keys: Box<dyn KeySource>,
        console: Box<dyn Console>,
        config: PlayerConfig,
    ) -> Self {
        let cell = StateCell::new();
        pipeline.connect(cell.handler());

        Self {
            pipeline,
            queue: QueueManager::with_history_limit(store.clone(), config.recently_played_limit),
            commands: CommandChannel::new(store.clone()),
            states: StateStore::new(store),
            cell,
            keys,
            console,
            config,
            spinner: Spinner::default(),
            current: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.cell.get()
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn states(&self) -> &StateStore {
        &self.states
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn print_key_legend(&mut self) {
        for line in KEY_LEGEND {
            self.console.line(line);
        }
        self.console.line("");
    }

    /// Run until quit. Store failures come back as errors; everything
    /// scoped to one track or one command is reported and survived.
    pub fn spin(&mut self) -> Result<()> {
        info!("Player spinning");
        self.cell.set(PlayerState::Idle);
        self.states.persist_state(PlayerState::Idle)?;

        loop {
            let flow = if self.cell.get() == PlayerState::Stopped {
                self.idle_tick()?
            } else {
                match self.queue.dequeue_front() {
                    Ok(Some(track)) => {
                        let exit = self.play_track(&track)?;
                        self.dispose(&track, exit)?
                    }
                    Ok(None) => self.idle_tick()?,
                    Err(Error::Json(e)) => {
                        warn!("Dropping malformed queue entry: {}", e);
                        self.console.error(&format!("malformed queue entry: {e}"));
                        Flow::Continue
                    }
                    Err(e) => return Err(e),
                }
            };
            if flow == Flow::Quit {
                break;
            }

            if self.check_for_command()? == Flow::Quit {
                break;
            }
            self.render_status();
        }

        info!("Player quitting");
        Ok(())
    }

    /// Play a single track to its end, then stop. Used by `deck play`.
    pub fn play_file(&mut self, track: &Track) -> Result<TrackExit> {
        self.cell.set(PlayerState::Idle);
        let exit = self.play_track(track)?;
        if let TrackExit::Ended { started } = exit {
            self.queue.archive(track)?;
            self.scrobble(track, started)?;
        }
        self.states.persist_state(PlayerState::Idle)?;
        Ok(exit)
    }

    /// Between tracks only volume, mute and quit are live; once stopped,
    /// only space (and quit) is. Commands are not filtered here.
    fn idle_tick(&mut self) -> Result<Flow> {
        let stopped = self.cell.get() == PlayerState::Stopped;
        match self.keys.poll_key(self.config.tick())? {
            Some(key) if idle_key(key, stopped) => self.handle_key(key),
            Some(key) => {
                debug!("Ignoring {:?} with nothing playing", key);
                Ok(Flow::Continue)
            }
            None => Ok(Flow::Continue),
        }
    }

    pub fn play_track(&mut self, track: &Track) -> Result<TrackExit> {
        if !track.exists() {
            warn!("Missing file {}", track.file.display());
            self.console
                .error(&format!("missing file \"{}\"", track.file.display()));
            return Ok(TrackExit::Missing);
        }

        info!("Playing {}", track.file.display());
        self.states.set_current_track(track)?;
        let width = self.console.width();
        self.console
            .line(&listing::format_track_text(track, '-', width));

        self.cell.set(PlayerState::Loading);
        if let Err(e) = self.pipeline.set_uri(&track.file) {
            self.pipeline_failed(e);
        } else {
            self.drive(PipelineState::Playing)?;
        }
        let started = epoch_seconds();
        self.current = Some(track.clone());

        let mut flow = Flow::Continue;
        while !self.cell.get().ends_track() {
            if let Some(key) = self.keys.poll_key(self.config.key_timeout())? {
                flow = self.handle_key(key)?;
            }
            if flow == Flow::Continue {
                flow = self.check_for_command()?;
            }
            if flow == Flow::Quit {
                break;
            }
            self.report_pipeline_error();
            self.render_status();
        }

        self.current = None;
        self.report_pipeline_error();
        // idempotent; an ended stream still holds its decoder
        self.pipeline_set(PipelineState::Null);
        self.states.clear_current_track()?;

        if flow == Flow::Quit {
            return Ok(TrackExit::Quit);
        }
        Ok(match self.cell.get() {
            PlayerState::Stopped => TrackExit::Stopped,
            PlayerState::Skipped => TrackExit::Skipped,
            PlayerState::Previous => TrackExit::Previous,
            _ => TrackExit::Ended { started },
        })
    }

    /// Post-track bookkeeping
    pub fn dispose(&mut self, track: &Track, exit: TrackExit) -> Result<Flow> {
        debug!("Track exit {:?} for {}", exit, track.file.display());
        match exit {
            TrackExit::Ended { started } => {
                self.queue.archive(track)?;
                self.scrobble(track, started)?;
            }
            TrackExit::Stopped => {
                self.queue.requeue_front(track)?;
                return Ok(Flow::Continue);
            }
            TrackExit::Quit => {
                self.queue.requeue_front(track)?;
                return Ok(Flow::Quit);
            }
            TrackExit::Skipped | TrackExit::Previous | TrackExit::Missing => {}
        }
        self.cell.set(PlayerState::Idle);
        self.states.persist_state(PlayerState::Idle)?;
        Ok(Flow::Continue)
    }

    fn scrobble(&self, track: &Track, started: f64) -> Result<()> {
        self.queue.push_scrobble(&ScrobbleRecord {
            track: track.clone(),
            started,
        })
    }

    pub fn handle_key(&mut self, key: Key) -> Result<Flow> {
        let playing = self.current.is_some();
        match key {
            Key::Quit => return Ok(Flow::Quit),
            Key::PauseResume if playing => self.pause_or_resume()?,
            Key::PauseResume => {
                if self.cell.get() == PlayerState::Stopped {
                    debug!("Resuming from stop");
                    self.cell.set(PlayerState::Idle);
                    self.states.persist_state(PlayerState::Idle)?;
                }
            }
            Key::SeekBackward if playing => self.relative_seek(-self.config.seek_step_seconds, true),
            Key::SeekForward if playing => self.relative_seek(self.config.seek_step_seconds, true),
            Key::Position(digit) if playing => self.set_position(digit),
            Key::VolumeUp => self.adjust_volume(self.config.volume_step)?,
            Key::VolumeDown => self.adjust_volume(-self.config.volume_step)?,
            Key::ToggleMute => self.toggle_mute()?,
            Key::Stop if playing => self.stop()?,
            Key::Stop => {
                self.cell.set(PlayerState::Stopped);
                self.states.persist_state(PlayerState::Stopped)?;
            }
            Key::Skip if playing => self.skip()?,
            Key::Next if playing => self.next()?,
            Key::Previous if playing => self.previous()?,
            Key::Previous => {
                self.queue.recall_previous()?;
            }
            _ => {}
        }
        Ok(Flow::Continue)
    }

    fn check_for_command(&mut self) -> Result<Flow> {
        match self.commands.poll_and_clear() {
            Ok(Some(command)) => {
                debug!("Received command {}", command);
                self.handle_key(command_key(command))
            }
            Ok(None) => Ok(Flow::Continue),
            Err(e @ Error::UnknownCommand(_)) => {
                warn!("{}", e);
                self.console.error(&e.to_string());
                Ok(Flow::Continue)
            }
            Err(e) => Err(e),
        }
    }

    pub fn pause_or_resume(&mut self) -> Result<()> {
        match self.cell.get() {
            state if state.is_audible() => {
                self.drive(PipelineState::Paused)?;
                // step back a touch so resuming does not clip
                self.relative_seek(-0.05, false);
            }
            PlayerState::Paused | PlayerState::Stopped => self.drive(PipelineState::Playing)?,
            _ => {}
        }
        if let Some(track) = &self.current {
            self.states.set_current_track(track)?;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.finish_track(PlayerState::Stopped)
    }

    pub fn skip(&mut self) -> Result<()> {
        self.finish_track(PlayerState::Skipped)
    }

    /// Treated as a normal completion: archived and scrobbled.
    pub fn next(&mut self) -> Result<()> {
        self.states.clear_current_track()?;
        self.drive(PipelineState::Paused)?;
        self.drive(PipelineState::Null)?;
        self.cell.set(PlayerState::Ended);
        Ok(())
    }

    pub fn previous(&mut self) -> Result<()> {
        if self.queue.recall_previous()?.is_none() {
            // nothing to go back to: start this one again
            if let Some(track) = &self.current {
                self.queue.requeue_front(track)?;
            }
        }
        self.drive(PipelineState::Paused)?;
        self.finish_track(PlayerState::Previous)
    }

    fn finish_track(&mut self, terminal: PlayerState) -> Result<()> {
        self.states.clear_current_track()?;
        self.pipeline_set(PipelineState::Null);
        self.cell.set(terminal);
        self.states.persist_state(terminal)
    }

    pub fn relative_seek(&mut self, seconds: f64, show_state: bool) {
        let Some(position) = self.pipeline.query_position() else {
            return;
        };
        let mut target = (position.as_secs_f64() + seconds).max(0.0);
        if let Some(duration) = self.pipeline.query_duration() {
            target = target.min(duration.as_secs_f64());
        }

        let prior = self.cell.get();
        if show_state {
            self.cell.set(if seconds < 0.0 {
                PlayerState::SeekingBackward
            } else {
                PlayerState::SeekingForward
            });
            self.render_status();
        }

        self.seek_to(Duration::from_secs_f64(target));

        if show_state {
            // leave the seek glyph up long enough to be seen
            thread::sleep(self.config.seek_indicator());
            let now = self.cell.get();
            if matches!(now, PlayerState::SeekingForward | PlayerState::SeekingBackward) {
                self.cell.set(prior);
            }
        }
    }

    /// Digit keys jump to deciles: 1 is the start, 0 is 90%.
    pub fn set_position(&mut self, digit: u8) {
        let decile = if digit == 0 { 9 } else { u32::from(digit.min(9)) - 1 };
        let Some(duration) = self.pipeline.query_duration() else {
            return;
        };
        self.seek_to(duration * decile / 10);
    }

    fn seek_to(&mut self, target: Duration) {
        if let Err(e) = self.pipeline.seek(target) {
            warn!("Seek failed: {}", e);
            self.console.error(&e.to_string());
        }
    }

    pub fn volume(&self) -> i64 {
        (self.pipeline.volume() * 1000.0).round() as i64
    }

    pub fn adjust_volume(&mut self, delta: i64) -> Result<()> {
        self.set_volume(self.volume() + delta)
    }

    pub fn set_volume(&mut self, volume: i64) -> Result<()> {
        let volume = volume.clamp(0, 1000);
        self.pipeline.set_volume(volume as f64 / 1000.0);
        self.states.set_volume(volume)?;
        self.unmute()
    }

    pub fn toggle_mute(&mut self) -> Result<()> {
        if self.pipeline.is_muted() {
            self.unmute()
        } else {
            self.mute()
        }
    }

    pub fn mute(&mut self) -> Result<()> {
        self.pipeline.set_muted(true);
        self.states.set_muted(true)
    }

    pub fn unmute(&mut self) -> Result<()> {
        self.pipeline.set_muted(false);
        self.states.set_muted(false)
    }

    /// Ask the pipeline for a state and mirror it in the cell and the store.
    fn drive(&mut self, target: PipelineState) -> Result<()> {
        let state = match target {
            PipelineState::Playing => PlayerState::Playing,
            PipelineState::Paused => PlayerState::Paused,
            PipelineState::Null => PlayerState::Idle,
        };
        // set first: the pipeline may answer synchronously with an error
        self.cell.set(state);
        self.pipeline_set(target);
        self.states.persist_state(state)
    }

    fn pipeline_set(&mut self, target: PipelineState) {
        if let Err(e) = self.pipeline.set_state(target) {
            self.pipeline_failed(e);
        }
    }

    fn pipeline_failed(&mut self, error: Error) {
        self.cell.apply_pipeline(PipelineMessage::Error {
            message: error.to_string(),
            debug: None,
        });
    }

    fn report_pipeline_error(&mut self) {
        if let Some(message) = self.cell.take_error() {
            self.console.error(&message);
        }
    }

    pub fn render_status(&mut self) {
        let state = self.cell.get();
        let view = StatusView {
            glyph: state.glyph().unwrap_or_else(|| self.spinner.next_frame()),
            volume: self.volume(),
            muted: self.pipeline.is_muted(),
            position: self.pipeline.query_position(),
            duration: self.pipeline.query_duration(),
        };
        let width = self.console.width();
        self.console.status(&status::render(&view, width));
    }
}

fn idle_key(key: Key, stopped: bool) -> bool {
    match key {
        Key::Quit => true,
        Key::PauseResume => stopped,
        Key::VolumeUp | Key::VolumeDown | Key::ToggleMute => !stopped,
        _ => false,
    }
}

fn command_key(command: Command) -> Key {
    match command {
        Command::Pause => Key::PauseResume,
        Command::Next => Key::Next,
        Command::Previous => Key::Previous,
        Command::Stop => Key::Stop,
        Command::Skip => Key::Skip,
        Command::Quit => Key::Quit,
    }
}

pub fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::pipeline::fake::FakePipeline;
    use crate::audio::{EnqueueMode, TrackTags};
    use crate::store::keys;
    use crate::ui::events::ScriptedKeys;
    use crate::ui::RecordingConsole;
    use std::fs;
    use std::path::Path;

    pub(crate) fn fast_config() -> PlayerConfig {
        PlayerConfig {
            tick_ms: 0,
            key_timeout_ms: 0,
            seek_indicator_ms: 0,
            ..PlayerConfig::default()
        }
    }

    pub(crate) fn media(dir: &Path, name: &str) -> Track {
        let file = dir.join(format!("{name}.mp3"));
        fs::write(&file, b"not really audio").unwrap();
        Track::new(
            file,
            TrackTags {
                title: Some(name.to_string()),
                ..TrackTags::default()
            },
        )
    }

    struct Rig {
        store: SharedStore,
        pipeline: FakePipeline,
        console: RecordingConsole,
        player: Player<FakePipeline>,
    }

    fn rig(script: Vec<Option<Key>>) -> Rig {
        let store = SharedStore::in_memory("test");
        let pipeline = FakePipeline::new();
        let console = RecordingConsole::default();
        let player = Player::new(
            pipeline.clone(),
            store.clone(),
            Box::new(ScriptedKeys::new(script)),
            Box::new(console.clone()),
            fast_config(),
        );
        Rig {
            store,
            pipeline,
            console,
            player,
        }
    }

    fn recent(rig: &Rig) -> Vec<Track> {
        rig.player.queue().peek_recent(-1).unwrap()
    }

    fn queued(rig: &Rig) -> Vec<Track> {
        rig.player.queue().peek_range(-1).unwrap()
    }

    #[test]
    fn end_of_stream_archives_and_scrobbles() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![None, None, None]);
        rig.pipeline.inner().finish_after_polls = Some(2);

        let before = epoch_seconds();
        let exit = rig.player.play_track(&x).unwrap();
        assert!(matches!(exit, TrackExit::Ended { started } if started >= before));
        rig.player.dispose(&x, exit).unwrap();

        assert_eq!(recent(&rig), vec![x.clone()]);
        let scrobble = rig.player.queue().peek_scrobble().unwrap().unwrap();
        assert_eq!(scrobble.track, x);
        assert!(scrobble.started <= epoch_seconds());
        assert_eq!(rig.player.states().current_track().unwrap(), None);
        assert_eq!(rig.store.get(keys::STATE).unwrap().as_deref(), Some("null"));
    }

    #[test]
    fn current_track_is_persisted_while_playing() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let store_seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let mut rig = rig(vec![None]);
        {
            let seen = store_seen.clone();
            let store = rig.store.clone();
            // snapshot current_track from the pipeline thread mid-play
            rig.pipeline.connect(std::sync::Arc::new(move |message: PipelineMessage| {
                if message == PipelineMessage::StateChanged(PipelineState::Playing) {
                    *seen.lock().unwrap() = store.get(keys::CURRENT_TRACK).unwrap();
                }
            }));
        }
        rig.player.play_track(&x).unwrap();
        let seen = store_seen.lock().unwrap().clone().unwrap();
        assert_eq!(Track::from_record(&seen).unwrap(), x);
    }

    #[test]
    fn skip_discards_the_track() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![None, Some(Key::Skip)]);

        let exit = rig.player.play_track(&x).unwrap();
        assert_eq!(exit, TrackExit::Skipped);
        rig.player.dispose(&x, exit).unwrap();

        assert!(queued(&rig).is_empty());
        assert!(recent(&rig).is_empty());
        assert_eq!(rig.player.states().current_track().unwrap(), None);
        assert_eq!(rig.player.queue().scrobble_backlog().unwrap(), 0);
        assert_eq!(rig.pipeline.inner().state, Some(PipelineState::Null));
    }

    #[test]
    fn stop_requeues_at_head_and_waits_for_space() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let y = media(dir.path(), "y");
        let mut rig = rig(vec![Some(Key::Stop), None, None, Some(Key::Quit)]);
        rig.player
            .queue()
            .enqueue_tracks(&[x.clone(), y.clone()], EnqueueMode::Append)
            .unwrap();

        rig.player.spin().unwrap();

        assert_eq!(rig.player.state(), PlayerState::Stopped);
        assert_eq!(queued(&rig), vec![x, y]);
        assert_eq!(rig.store.get(keys::STATE).unwrap().as_deref(), Some("stopped"));
        assert_eq!(rig.player.states().current_track().unwrap(), None);
    }

    #[test]
    fn space_resumes_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![
            Some(Key::Stop),
            None,
            Some(Key::PauseResume),
            // second run of x: skip it, then quit while idle
            Some(Key::Skip),
            Some(Key::Quit),
        ]);
        rig.player
            .queue()
            .enqueue_tracks(&[x.clone()], EnqueueMode::Append)
            .unwrap();

        rig.player.spin().unwrap();
        assert!(queued(&rig).is_empty());
        let plays = rig
            .pipeline
            .inner()
            .states
            .iter()
            .filter(|s| **s == PipelineState::Playing)
            .count();
        assert_eq!(plays, 2);
    }

    #[test]
    fn quit_mid_track_keeps_the_track() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![None, Some(Key::Quit)]);
        rig.player
            .queue()
            .enqueue_tracks(&[x.clone()], EnqueueMode::Append)
            .unwrap();

        rig.player.spin().unwrap();
        assert_eq!(queued(&rig), vec![x]);
        assert!(recent(&rig).is_empty());
        assert_eq!(rig.player.states().current_track().unwrap(), None);
    }

    #[test]
    fn previous_recalls_history_head() {
        let dir = tempfile::tempdir().unwrap();
        let a = media(dir.path(), "a");
        let b = media(dir.path(), "b");
        let c = media(dir.path(), "c");
        let rest = media(dir.path(), "rest");
        let mut rig = rig(vec![Some(Key::Previous)]);
        rig.player.queue().archive(&a).unwrap();
        rig.player.queue().archive(&b).unwrap();
        rig.player
            .queue()
            .enqueue_tracks(&[rest.clone()], EnqueueMode::Append)
            .unwrap();

        let exit = rig.player.play_track(&c).unwrap();
        assert_eq!(exit, TrackExit::Previous);
        rig.player.dispose(&c, exit).unwrap();

        assert_eq!(queued(&rig), vec![b, rest]);
        assert_eq!(recent(&rig), vec![a]);
        assert_eq!(rig.player.queue().scrobble_backlog().unwrap(), 0);
    }

    #[test]
    fn previous_without_history_restarts_the_track() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![Some(Key::Previous)]);

        let exit = rig.player.play_track(&x).unwrap();
        rig.player.dispose(&x, exit).unwrap();
        assert_eq!(queued(&rig), vec![x]);
    }

    #[test]
    fn next_counts_as_a_finished_play() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![None, Some(Key::Next)]);

        let exit = rig.player.play_track(&x).unwrap();
        assert!(matches!(exit, TrackExit::Ended { .. }));
        rig.player.dispose(&x, exit).unwrap();
        assert_eq!(recent(&rig), vec![x]);
        assert_eq!(rig.player.queue().scrobble_backlog().unwrap(), 1);

        let states = rig.pipeline.inner().states.clone();
        assert_eq!(
            &states[states.len() - 3..],
            &[PipelineState::Paused, PipelineState::Null, PipelineState::Null]
        );
    }

    #[test]
    fn commands_from_other_processes_drive_the_track() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![None, None, None]);
        let channel = CommandChannel::new(rig.store.clone());
        channel.send(Command::Pause).unwrap();
        channel.send(Command::Skip).unwrap();

        let exit = rig.player.play_track(&x).unwrap();
        assert_eq!(exit, TrackExit::Skipped);
        // only the last write was seen
        assert!(!rig.pipeline.inner().states.contains(&PipelineState::Paused));
    }

    #[test]
    fn unknown_commands_are_reported_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![None, Some(Key::Skip)]);
        rig.store.set(keys::COMMAND, "rewind").unwrap();

        let exit = rig.player.play_track(&x).unwrap();
        assert_eq!(exit, TrackExit::Skipped);
        let output = rig.console.output.lock().unwrap();
        assert_eq!(output.errors, vec!["unknown command \"rewind\" received"]);
    }

    #[test]
    fn pause_toggles_and_steps_back() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![
            Some(Key::PauseResume),
            None,
            Some(Key::PauseResume),
            Some(Key::Skip),
        ]);
        rig.pipeline.inner().position = Duration::from_secs(10);

        rig.player.play_track(&x).unwrap();
        let inner = rig.pipeline.inner();
        assert_eq!(
            inner.states,
            vec![
                PipelineState::Playing,
                PipelineState::Paused,
                PipelineState::Playing,
                PipelineState::Null,
                PipelineState::Null,
            ]
        );
        assert_eq!(inner.seeks.len(), 1);
        assert!((inner.seeks[0].as_secs_f64() - 9.95).abs() < 1e-6);
    }

    #[test]
    fn paused_state_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![Some(Key::PauseResume)]);
        rig.player.play_track(&x).unwrap();
        // quit came after the pause; the last persisted state is paused
        assert_eq!(rig.store.get(keys::STATE).unwrap().as_deref(), Some("paused"));
    }

    #[test]
    fn seeks_clamp_to_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![
            Some(Key::SeekBackward),
            Some(Key::Position(0)),
            Some(Key::SeekForward),
            Some(Key::Position(1)),
            Some(Key::Position(5)),
            Some(Key::Skip),
        ]);
        rig.pipeline.inner().position = Duration::from_secs(5);
        rig.pipeline.inner().duration = Duration::from_secs(200);

        rig.player.play_track(&x).unwrap();
        assert_eq!(
            rig.pipeline.inner().seeks,
            vec![
                Duration::ZERO,
                Duration::from_secs(180),
                Duration::from_secs(195),
                Duration::ZERO,
                Duration::from_secs(80),
            ]
        );
        // the seek glyph never outlives the seek
        assert_eq!(rig.player.state(), PlayerState::Skipped);
    }

    #[test]
    fn volume_clamps_and_unmutes() {
        let mut rig = rig(vec![]);
        rig.player.set_volume(980).unwrap();
        rig.player.adjust_volume(50).unwrap();
        assert_eq!(rig.player.volume(), 1000);

        rig.player.set_volume(0).unwrap();
        rig.player.adjust_volume(-50).unwrap();
        assert_eq!(rig.player.volume(), 0);
        assert_eq!(rig.store.get(keys::VOLUME).unwrap().as_deref(), Some("0"));

        rig.player.toggle_mute().unwrap();
        assert!(rig.pipeline.is_muted());
        assert_eq!(rig.store.get(keys::MUTED).unwrap().as_deref(), Some("1"));
        rig.player.adjust_volume(50).unwrap();
        assert!(!rig.pipeline.is_muted());
        assert_eq!(rig.store.get(keys::MUTED).unwrap().as_deref(), Some("0"));
    }

    #[test]
    fn pipeline_errors_end_only_the_track() {
        let dir = tempfile::tempdir().unwrap();
        let bad = media(dir.path(), "bad");
        let good = media(dir.path(), "good");
        let mut rig = rig(vec![None, Some(Key::Skip), Some(Key::Quit)]);
        rig.pipeline.inner().fail_on_play = Some("cannot decode".into());
        rig.player
            .queue()
            .enqueue_tracks(&[bad.clone(), good.clone()], EnqueueMode::Append)
            .unwrap();

        // the fake fails every play, so both tracks end early
        rig.player.spin().unwrap();
        let output = rig.console.output.lock().unwrap();
        assert_eq!(output.errors[0], "error \"cannot decode\"");
        assert_eq!(recent(&rig)[0..2].to_vec(), vec![good, bad]);
    }

    #[test]
    fn missing_files_are_reported_and_dropped() {
        let mut rig = rig(vec![Some(Key::Quit)]);
        let ghost = Track::new("/nowhere/ghost.mp3".into(), TrackTags::default());
        rig.player
            .queue()
            .enqueue_tracks(&[ghost], EnqueueMode::Append)
            .unwrap();

        rig.player.spin().unwrap();
        assert!(queued(&rig).is_empty());
        let output = rig.console.output.lock().unwrap();
        assert_eq!(output.errors, vec!["missing file \"/nowhere/ghost.mp3\""]);
    }

    #[test]
    fn malformed_queue_entries_do_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![Some(Key::Skip), Some(Key::Quit)]);
        rig.store.push_back(keys::QUEUE, "{\"tags\": {}}").unwrap();
        rig.player
            .queue()
            .enqueue_tracks(&[x], EnqueueMode::Append)
            .unwrap();

        rig.player.spin().unwrap();
        assert!(queued(&rig).is_empty());
        let output = rig.console.output.lock().unwrap();
        assert!(output.errors[0].starts_with("malformed queue entry"));
    }

    #[test]
    fn idle_commands() {
        let dir = tempfile::tempdir().unwrap();
        let a = media(dir.path(), "a");
        let mut rig = rig(vec![None, Some(Key::Quit)]);
        rig.player.queue().archive(&a).unwrap();
        CommandChannel::new(rig.store.clone())
            .send(Command::Stop)
            .unwrap();

        // empty queue: stop parks the player, previous is recalled without playing
        rig.player.spin().unwrap();
        assert_eq!(rig.player.state(), PlayerState::Stopped);
        assert!(rig.pipeline.inner().states.is_empty());

        rig.player.handle_key(Key::Previous).unwrap();
        assert_eq!(queued(&rig), vec![a]);
    }

    #[test]
    fn idle_keys_only_touch_volume() {
        let dir = tempfile::tempdir().unwrap();
        let a = media(dir.path(), "a");
        let mut rig = rig(vec![
            Some(Key::Previous),
            Some(Key::Stop),
            Some(Key::VolumeDown),
            Some(Key::Quit),
        ]);
        rig.player.queue().archive(&a).unwrap();

        rig.player.spin().unwrap();
        assert!(queued(&rig).is_empty());
        assert_eq!(recent(&rig), vec![a]);
        assert_eq!(rig.player.state(), PlayerState::Idle);
        assert_eq!(rig.player.volume(), 950);
    }

    #[test]
    fn stopped_player_waits_for_space_only() {
        let mut rig = rig(vec![None, Some(Key::VolumeUp), Some(Key::ToggleMute), Some(Key::Quit)]);
        rig.player.set_volume(500).unwrap();
        CommandChannel::new(rig.store.clone())
            .send(Command::Stop)
            .unwrap();

        rig.player.spin().unwrap();
        assert_eq!(rig.player.state(), PlayerState::Stopped);
        assert_eq!(rig.player.volume(), 500);
        assert!(!rig.pipeline.is_muted());
    }

    #[test]
    fn status_line_reflects_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let x = media(dir.path(), "x");
        let mut rig = rig(vec![None, Some(Key::Quit)]);
        rig.pipeline.inner().position = Duration::from_secs(100);

        rig.player.play_track(&x).unwrap();
        let output = rig.console.output.lock().unwrap();
        let status = output.last_status.clone().unwrap();
        assert!(status.starts_with("  ▶  [==========]   01:40 ["));
        assert!(status.ends_with("] 03:20"));
        assert!(output.lines[0].starts_with("- x"));
    }
}
