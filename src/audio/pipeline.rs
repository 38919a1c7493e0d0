// The media pipeline is the only thing that actually makes sound.
// The player drives it through this trait and hears back through a message callback
// that fires on the pipeline's own thread.

use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Null,
    Paused,
    Playing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage {
    StateChanged(PipelineState),
    EndOfStream,
    Error { message: String, debug: Option<String> },
    /// Informational traffic (clock, latency, tags...) the player ignores
    Ignorable(&'static str),
    /// Anything the pipeline emits that we have no mapping for
    Unknown(String),
}

pub type MessageHandler = Arc<dyn Fn(PipelineMessage) + Send + Sync>;

pub trait MediaPipeline {
    /// Install the message callback. Replaces any previous handler.
    fn connect(&mut self, handler: MessageHandler);

    fn set_uri(&mut self, file: &Path) -> Result<()>;
    fn set_state(&mut self, state: PipelineState) -> Result<()>;
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// None until a stream is loaded and its clock is known
    fn query_position(&self) -> Option<Duration>;
    fn query_duration(&self) -> Option<Duration>;

    /// linear gain, 0.0..=1.0
    fn volume(&self) -> f64;
    fn set_volume(&mut self, volume: f64);
    fn is_muted(&self) -> bool;
    fn set_muted(&mut self, muted: bool);
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard};

    /// Scriptable pipeline for state machine tests. Messages are delivered
    /// synchronously from whichever call triggers them.
    #[derive(Clone, Default)]
    pub struct FakePipeline {
        inner: Arc<Mutex<FakeInner>>,
        handler: Arc<Mutex<Option<MessageHandler>>>,
    }

    #[derive(Default)]
    pub struct FakeInner {
        pub uri: Option<PathBuf>,
        pub state: Option<PipelineState>,
        pub states: Vec<PipelineState>,
        pub seeks: Vec<Duration>,
        pub position: Duration,
        pub duration: Duration,
        pub volume: f64,
        pub muted: bool,
        /// emit EndOfStream after this many position queries
        pub finish_after_polls: Option<usize>,
        /// emit Error when playback starts
        pub fail_on_play: Option<String>,
        pub polls: usize,
    }

    impl FakePipeline {
        pub fn new() -> Self {
            let fake = Self::default();
            {
                let mut inner = fake.inner();
                inner.volume = 1.0;
                inner.duration = Duration::from_secs(200);
            }
            fake
        }

        pub fn inner(&self) -> MutexGuard<'_, FakeInner> {
            self.inner.lock().unwrap()
        }

        pub fn emit(&self, message: PipelineMessage) {
            let handler = self.handler.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(message);
            }
        }
    }

    impl MediaPipeline for FakePipeline {
        fn connect(&mut self, handler: MessageHandler) {
            *self.handler.lock().unwrap() = Some(handler);
        }

        fn set_uri(&mut self, file: &Path) -> Result<()> {
            let mut inner = self.inner();
            inner.uri = Some(file.to_path_buf());
            inner.polls = 0;
            Ok(())
        }

        fn set_state(&mut self, state: PipelineState) -> Result<()> {
            let failure = {
                let mut inner = self.inner();
                inner.state = Some(state);
                inner.states.push(state);
                if state == PipelineState::Null {
                    inner.uri = None;
                }
                (state == PipelineState::Playing)
                    .then(|| inner.fail_on_play.clone())
                    .flatten()
            };
            match failure {
                Some(message) => self.emit(PipelineMessage::Error {
                    message,
                    debug: None,
                }),
                None => self.emit(PipelineMessage::StateChanged(state)),
            }
            Ok(())
        }

        fn seek(&mut self, position: Duration) -> Result<()> {
            let mut inner = self.inner();
            inner.seeks.push(position);
            inner.position = position;
            Ok(())
        }

        fn query_position(&self) -> Option<Duration> {
            let finished = {
                let mut inner = self.inner();
                inner.uri.as_ref()?;
                inner.polls += 1;
                inner.finish_after_polls == Some(inner.polls)
            };
            if finished {
                self.emit(PipelineMessage::EndOfStream);
            }
            Some(self.inner().position)
        }

        fn query_duration(&self) -> Option<Duration> {
            let inner = self.inner();
            inner.uri.as_ref().map(|_| inner.duration)
        }

        fn volume(&self) -> f64 {
            self.inner().volume
        }

        fn set_volume(&mut self, volume: f64) {
            self.inner().volume = volume;
        }

        fn is_muted(&self) -> bool {
            self.inner().muted
        }

        fn set_muted(&mut self, muted: bool) {
            self.inner().muted = muted;
        }
    }
}
