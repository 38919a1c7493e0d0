use super::pipeline::{MediaPipeline, MessageHandler, PipelineMessage, PipelineState};
use crate::{Error, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const DRAIN_POLL: Duration = Duration::from_millis(100);

/// rodio-backed pipeline. The output stream must stay on the thread that
/// created it, so build this inside the playback thread.
pub struct RodioPipeline {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Arc<Sink>>,
    uri: Option<PathBuf>,
    duration: Option<Duration>,
    volume: f64,
    muted: bool,
    handler: Arc<Mutex<Option<MessageHandler>>>,
    // bumped whenever the current sink is torn down so stale watchers go quiet
    generation: Arc<AtomicU64>,
}

impl RodioPipeline {
    pub fn new() -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| Error::Pipeline(format!("no audio output: {e}")))?;

        Ok(Self {
            _stream: stream,
            stream_handle,
            sink: None,
            uri: None,
            duration: None,
            volume: 1.0,
            muted: false,
            handler: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    fn emit(&self, message: PipelineMessage) {
        emit(&self.handler, message);
    }

    fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume as f32
        }
    }

    fn start(&mut self, file: &Path) -> Result<()> {
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| Error::Pipeline(format!("cannot open sink: {e}")))?;
        sink.set_volume(self.effective_volume());

        let reader = File::open(file)
            .map_err(|e| Error::Pipeline(format!("failed to open \"{}\": {e}", file.display())))?;
        let source = Decoder::new(BufReader::new(reader)).map_err(|e| {
            Error::Pipeline(format!(
                "unsupported audio format or corrupted file \"{}\": {e}",
                file.display()
            ))
        })?;

        self.duration = source.total_duration();
        sink.append(source);
        sink.play();

        let sink = Arc::new(sink);
        self.sink = Some(sink.clone());
        self.watch_for_drain(sink);
        Ok(())
    }

    /// rodio has no bus, so a watcher thread turns "sink drained" into EndOfStream
    fn watch_for_drain(&self, sink: Arc<Sink>) {
        let generation = self.generation.load(Ordering::SeqCst);
        let current = self.generation.clone();
        let handler = self.handler.clone();

        thread::spawn(move || loop {
            thread::sleep(DRAIN_POLL);
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            if sink.empty() {
                debug!("Sink drained, end of stream");
                emit(&handler, PipelineMessage::EndOfStream);
                return;
            }
        });
    }

    fn teardown(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.duration = None;
    }
}

fn emit(handler: &Mutex<Option<MessageHandler>>, message: PipelineMessage) {
    let handler = handler
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    if let Some(handler) = handler {
        handler(message);
    }
}

impl MediaPipeline for RodioPipeline {
    fn connect(&mut self, handler: MessageHandler) {
        *self
            .handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    fn set_uri(&mut self, file: &Path) -> Result<()> {
        self.teardown();
        self.uri = Some(file.to_path_buf());
        Ok(())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        match state {
            PipelineState::Null => {
                self.teardown();
                self.uri = None;
                return Ok(());
            }
            PipelineState::Paused => match &self.sink {
                Some(sink) => sink.pause(),
                None => return Ok(()),
            },
            PipelineState::Playing => match (self.sink.clone(), self.uri.clone()) {
                (Some(sink), _) => sink.play(),
                (None, Some(file)) => {
                    if let Err(e) = self.start(&file) {
                        warn!("Pipeline failed to start {}: {}", file.display(), e);
                        self.emit(PipelineMessage::Error {
                            message: e.to_string(),
                            debug: None,
                        });
                        return Ok(());
                    }
                }
                (None, None) => return Ok(()),
            },
        }

        self.emit(PipelineMessage::StateChanged(state));
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if let Some(sink) = &self.sink {
            sink.try_seek(position)
                .map_err(|e| Error::Pipeline(format!("seek failed: {e}")))?;
        }
        Ok(())
    }

    fn query_position(&self) -> Option<Duration> {
        self.sink.as_ref().map(|sink| sink.get_pos())
    }

    fn query_duration(&self) -> Option<Duration> {
        self.duration
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.effective_volume());
        }
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Some(sink) = &self.sink {
            sink.set_volume(self.effective_volume());
        }
    }
}

impl Drop for RodioPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
