use super::command::{Command, CommandChannel};
use crate::audio::scanner::Resolution;
use crate::audio::{EnqueueMode, PathResolver, ScrobbleRecord, Track};
use crate::store::{keys, SharedStore};
use crate::Result;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// The pending queue, the recently played ring and the scrobble backlog,
/// all as JSON records in store lists.
#[derive(Clone)]
pub struct QueueManager {
    store: SharedStore,
    resolver: PathResolver,
    history_limit: usize,
}

impl QueueManager {
    pub fn new(store: SharedStore) -> Self {
        Self::with_history_limit(store, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(store: SharedStore, history_limit: usize) -> Self {
        Self {
            store,
            resolver: PathResolver::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Expand `paths` and push every usable track. Per-path failures come
    /// back in the resolution for the caller to report.
    pub fn enqueue(&self, paths: &[PathBuf], mode: EnqueueMode) -> Result<Resolution> {
        let resolution = self.resolver.resolve(paths);
        self.enqueue_tracks(&resolution.tracks, mode)?;
        Ok(resolution)
    }

    /// Like `enqueue`, but a leading `-` reads the path list from `stdin`.
    pub fn enqueue_with_stdin<R: BufRead>(
        &self,
        paths: &[PathBuf],
        mode: EnqueueMode,
        stdin: R,
    ) -> Result<Resolution> {
        let resolution = self.resolver.resolve_with_stdin(paths, stdin);
        self.enqueue_tracks(&resolution.tracks, mode)?;
        Ok(resolution)
    }

    /// Play `paths` right away, then carry on with whatever was playing.
    /// The current track goes back to the head first so the new batch lands
    /// in front of it, then the player is told to skip.
    pub fn interrupt<R: BufRead>(
        &self,
        paths: &[PathBuf],
        stdin: R,
        commands: &CommandChannel,
    ) -> Result<Resolution> {
        if let Some(record) = self.store.get_del(keys::CURRENT_TRACK)? {
            self.requeue_record(&record)?;
        }
        let resolution = self.enqueue_with_stdin(paths, EnqueueMode::Prepend, stdin)?;
        commands.send(Command::Skip)?;
        info!("Interrupted with {} track(s)", resolution.tracks.len());
        Ok(resolution)
    }

    pub fn enqueue_tracks(&self, tracks: &[Track], mode: EnqueueMode) -> Result<()> {
        match mode {
            EnqueueMode::Append => {
                for track in tracks {
                    self.store.push_back(keys::QUEUE, &track.to_record()?)?;
                }
            }
            EnqueueMode::Prepend => {
                // pushed in reverse so the first listed ends up at the head
                for track in tracks.iter().rev() {
                    self.store.push_front(keys::QUEUE, &track.to_record()?)?;
                }
            }
        }
        debug!("Queued {} track(s) ({:?})", tracks.len(), mode);
        Ok(())
    }

    /// Pop the head of the queue. A malformed head is still removed, and
    /// comes back as `Err(Json)`.
    pub fn dequeue_front(&self) -> Result<Option<Track>> {
        match self.store.pop_front(keys::QUEUE)? {
            Some(record) => Track::from_record(&record).map(Some),
            None => Ok(None),
        }
    }

    pub fn requeue_front(&self, track: &Track) -> Result<()> {
        self.store.push_front(keys::QUEUE, &track.to_record()?)?;
        Ok(())
    }

    /// Requeue an already serialized record untouched.
    pub fn requeue_record(&self, record: &str) -> Result<()> {
        self.store.push_front(keys::QUEUE, record)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.delete(keys::QUEUE)?;
        info!("Queue cleared");
        Ok(())
    }

    /// Drop every queued entry whose file is one of `paths`. Returns how many went.
    pub fn remove(&self, paths: &[PathBuf]) -> Result<usize> {
        let targets: Vec<PathBuf> = paths.iter().map(|p| canonical_or_absolute(p)).collect();

        let mut removed = 0;
        for record in self.store.range(keys::QUEUE, 0, -1)? {
            // unparsable entries cannot match a path; leave them for dequeue to report
            let Ok(track) = Track::from_record(&record) else {
                continue;
            };
            if targets.contains(&track.file) {
                removed += self.store.remove(keys::QUEUE, 0, &record)?;
            }
        }
        Ok(removed)
    }

    /// First `count` queued tracks, -1 for all.
    pub fn peek_range(&self, count: i64) -> Result<Vec<Track>> {
        peek(&self.store, keys::QUEUE, count)
    }

    /// Most recent `count` finished tracks, newest first, -1 for all.
    pub fn peek_recent(&self, count: i64) -> Result<Vec<Track>> {
        peek(&self.store, keys::RECENTLY_PLAYED, count)
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len(keys::QUEUE)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn archive(&self, track: &Track) -> Result<()> {
        self.store
            .push_front(keys::RECENTLY_PLAYED, &track.to_record()?)?;
        self.store
            .trim(keys::RECENTLY_PLAYED, 0, self.history_limit as i64 - 1)
    }

    /// Move the newest history entry back onto the head of the queue.
    pub fn recall_previous(&self) -> Result<Option<Track>> {
        let Some(record) = self.store.pop_front(keys::RECENTLY_PLAYED)? else {
            return Ok(None);
        };
        self.store.push_front(keys::QUEUE, &record)?;
        Track::from_record(&record).map(Some)
    }

    pub fn push_scrobble(&self, record: &ScrobbleRecord) -> Result<()> {
        self.store
            .push_back(keys::SCROBBLE_QUEUE, &record.to_record()?)?;
        Ok(())
    }

    /// The oldest pending scrobble, left in place until `pop_scrobble`.
    pub fn peek_scrobble(&self) -> Result<Option<ScrobbleRecord>> {
        match self.store.index(keys::SCROBBLE_QUEUE, 0)? {
            Some(record) => ScrobbleRecord::from_record(&record).map(Some),
            None => Ok(None),
        }
    }

    pub fn pop_scrobble(&self) -> Result<()> {
        self.store.pop_front(keys::SCROBBLE_QUEUE)?;
        Ok(())
    }

    pub fn scrobble_backlog(&self) -> Result<usize> {
        self.store.len(keys::SCROBBLE_QUEUE)
    }
}

fn peek(store: &SharedStore, key: &str, count: i64) -> Result<Vec<Track>> {
    let records = match count {
        0 => return Ok(Vec::new()),
        c if c < 0 => store.range(key, 0, -1)?,
        c => store.range(key, 0, c - 1)?,
    };
    records.iter().map(|r| Track::from_record(r)).collect()
}

fn canonical_or_absolute(path: &Path) -> PathBuf {
    // a file deleted since it was queued can still be removed by its old path
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}
