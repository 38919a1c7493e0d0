// Background scrobbling: announce what is playing and submit finished plays.
// Runs as its own task and only ever talks to the store and the remote service.

#[cfg(feature = "scrobble")]
pub mod listenbrainz;

#[cfg(feature = "scrobble")]
pub use listenbrainz::ListenBrainzClient;

use crate::audio::Track;
use crate::config::ScrobbleConfig;
use crate::playback::{QueueManager, StateStore};
use crate::store::SharedStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScrobbleError {
    /// Network hiccup or overloaded service, worth another try
    #[error("temporary failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),
}

impl From<ScrobbleError> for Error {
    fn from(e: ScrobbleError) -> Self {
        Error::Scrobble(e.to_string())
    }
}

#[async_trait]
pub trait ScrobbleClient: Send + Sync {
    async fn update_now_playing(&self, track: &Track) -> std::result::Result<(), ScrobbleError>;
    /// `started` is unix epoch seconds
    async fn scrobble(&self, track: &Track, started: f64) -> std::result::Result<(), ScrobbleError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ScrobbleConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: Duration::from_secs(config.retry_delay_seconds),
        }
    }

    /// `Ok(true)` once the call succeeds, `Ok(false)` when every attempt hit
    /// a transient failure. Fatal failures come straight back.
    pub async fn run<F, Fut>(&self, what: &str, mut call: F) -> std::result::Result<bool, ScrobbleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<(), ScrobbleError>>,
    {
        for attempt in 1..=self.attempts {
            match call().await {
                Ok(()) => return Ok(true),
                Err(ScrobbleError::Transient(reason)) => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what, attempt, self.attempts, reason
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(false)
    }
}

pub struct Scrobbler<C: ScrobbleClient> {
    client: C,
    queue: QueueManager,
    states: StateStore,
    poll: Duration,
    retry: RetryPolicy,
    now_playing: Option<Track>,
}

impl<C: ScrobbleClient> Scrobbler<C> {
    pub fn new(client: C, store: SharedStore, config: &ScrobbleConfig) -> Self {
        Self {
            client,
            queue: QueueManager::new(store.clone()),
            states: StateStore::new(store),
            poll: Duration::from_millis(config.poll_ms),
            retry: RetryPolicy::from_config(config),
            now_playing: None,
        }
    }

    /// Poll forever. Returns only when the service rejects us for good or
    /// the store fails; playback carries on either way.
    pub async fn run(mut self) -> Result<()> {
        info!("Scrobbler running");
        loop {
            self.poll_once().await?;
            tokio::time::sleep(self.poll).await;
        }
    }

    pub async fn poll_once(&mut self) -> Result<()> {
        self.announce_current().await?;
        self.submit_next().await
    }

    async fn announce_current(&mut self) -> Result<()> {
        let current = match self.states.current_track() {
            Ok(current) => current,
            Err(Error::Json(e)) => {
                warn!("Unreadable current track: {}", e);
                None
            }
            Err(e) => return Err(e),
        };
        let Some(track) = current else {
            return Ok(());
        };
        if self.now_playing.as_ref() == Some(&track) {
            return Ok(());
        }

        self.now_playing = Some(track.clone());
        if !scrobbleable(&track) {
            return Ok(());
        }
        debug!("Now playing {}", track.display_title());
        self.retry
            .run("now playing update", || self.client.update_now_playing(&track))
            .await?;
        Ok(())
    }

    /// Submit the oldest finished play; it leaves the backlog only once accepted.
    async fn submit_next(&mut self) -> Result<()> {
        let record = match self.queue.peek_scrobble() {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(()),
            Err(Error::Json(e)) => {
                warn!("Dropping malformed scrobble record: {}", e);
                return self.queue.pop_scrobble();
            }
            Err(e) => return Err(e),
        };

        if !scrobbleable(&record.track) {
            debug!("Not scrobbling untagged {}", record.track.file.display());
            return self.queue.pop_scrobble();
        }

        let submitted = self
            .retry
            .run("scrobble", || {
                self.client.scrobble(&record.track, record.started)
            })
            .await?;
        if submitted {
            info!("Scrobbled {}", record.track.display_title());
            self.queue.pop_scrobble()?;
        }
        Ok(())
    }
}

/// Services need at least an artist and a title to match a listen
fn scrobbleable(track: &Track) -> bool {
    track.tags.artist.is_some() && track.tags.title.is_some()
}
