// NFC tag listener: scanning a tag swaps the queue for that tag's playlist.
// Tag UIDs arrive as hex lines from a reader bridge (serial adapter or FIFO).

use crate::audio::EnqueueMode;
use crate::config::NfcConfig;
use crate::playback::{Command, CommandChannel, QueueManager};
use crate::store::SharedStore;
use crate::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub trait TagReader: Send {
    /// Wait up to `timeout` for a tag. `Ok(None)` when nothing was presented.
    fn read_passive_target(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Reads one hex UID per line on a background thread.
pub struct LineUidReader {
    uids: Receiver<Vec<u8>>,
    _reader: JoinHandle<()>,
}

impl LineUidReader {
    pub fn open(device: &Path) -> Result<Self> {
        let file = File::open(device)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, uids) = crossbeam_channel::unbounded();
        let handle = thread::spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("NFC read failed: {}", e);
                        break;
                    }
                };
                match parse_uid(&line) {
                    Some(uid) => {
                        if tx.send(uid).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => debug!("Ignoring NFC line {:?}", line),
                }
            }
        });
        Self {
            uids,
            _reader: handle,
        }
    }
}

impl TagReader for LineUidReader {
    fn read_passive_target(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.uids.recv_timeout(timeout) {
            Ok(uid) => Ok(Some(uid)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "NFC reader closed",
            ))),
        }
    }
}

/// `04a2:1b` / `04 A2 1B` / `04a21b` all give the same bytes
pub fn parse_uid(line: &str) -> Option<Vec<u8>> {
    let digits: String = line
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

pub fn uid_hex(uid: &[u8]) -> String {
    uid.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct NfcListener {
    queue: QueueManager,
    commands: CommandChannel,
    playlist_dir: PathBuf,
    retrigger: Duration,
    poll: Duration,
    last_seen: HashMap<PathBuf, Instant>,
}

impl NfcListener {
    pub fn new(store: SharedStore, config: &NfcConfig) -> Self {
        Self {
            queue: QueueManager::new(store.clone()),
            commands: CommandChannel::new(store),
            playlist_dir: config.playlist_dir.clone(),
            retrigger: Duration::from_secs(config.retrigger_seconds),
            poll: Duration::from_millis(config.poll_ms),
            last_seen: HashMap::new(),
        }
    }

    pub fn playlist_for(&self, uid: &[u8]) -> PathBuf {
        self.playlist_dir.join(format!("{}.m3u", uid_hex(uid)))
    }

    /// Switch to the tag's playlist. Returns false when the same tag
    /// triggered within the retrigger window (a tag left on the reader
    /// reads many times over).
    pub fn handle_uid(&mut self, uid: &[u8], now: Instant) -> Result<bool> {
        let playlist = self.playlist_for(uid);
        if let Some(last) = self.last_seen.get(&playlist) {
            if now.saturating_duration_since(*last) < self.retrigger {
                return Ok(false);
            }
        }

        info!("NFC tag {} -> {}", uid_hex(uid), playlist.display());
        self.queue.clear()?;
        self.commands.send(Command::Skip)?;
        let resolution = self.queue.enqueue(&[playlist.clone()], EnqueueMode::Append)?;
        for (path, e) in &resolution.failures {
            warn!("NFC playlist entry {}: {}", path.display(), e);
        }
        self.last_seen.insert(playlist, now);
        Ok(true)
    }

    /// Poll the reader until it goes away. Store failures end the listener.
    pub fn listen<R: TagReader>(mut self, mut reader: R) -> Result<()> {
        loop {
            match reader.read_passive_target(self.poll) {
                Ok(Some(uid)) => {
                    self.handle_uid(&uid, Instant::now())?;
                }
                Ok(None) => {}
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("NFC reader closed, listener stopping");
                    return Ok(());
                }
                Err(e) => warn!("NFC: {}", e),
            }
        }
    }
}

/// Start the listener thread, or log once and carry on without one.
pub fn spawn(store: SharedStore, config: &NfcConfig) -> Option<JoinHandle<()>> {
    let Some(device) = &config.device else {
        debug!("No NFC reader configured");
        return None;
    };
    let reader = match LineUidReader::open(device) {
        Ok(reader) => reader,
        Err(e) => {
            warn!("No NFC reader found at {}: {}", device.display(), e);
            return None;
        }
    };

    let listener = NfcListener::new(store, config);
    Some(thread::spawn(move || {
        if let Err(e) = listener.listen(reader) {
            error!("NFC listener stopped: {}", e);
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;
    use std::fs;
    use std::io::Cursor;

    fn setup() -> (tempfile::TempDir, SharedStore, NfcConfig) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("song.mp3"), b"x").unwrap();
        fs::write(dir.path().join("04a21b.m3u"), "song.mp3\n").unwrap();
        let config = NfcConfig {
            device: None,
            playlist_dir: dir.path().to_path_buf(),
            retrigger_seconds: 10,
            poll_ms: 1,
        };
        (dir, SharedStore::in_memory("test"), config)
    }

    #[test]
    fn uid_parsing() {
        assert_eq!(parse_uid("04a21b"), Some(vec![0x04, 0xa2, 0x1b]));
        assert_eq!(parse_uid("04:A2:1B\r"), Some(vec![0x04, 0xa2, 0x1b]));
        assert_eq!(parse_uid("04 a2 1b"), Some(vec![0x04, 0xa2, 0x1b]));
        assert_eq!(parse_uid("abc"), None);
        assert_eq!(parse_uid("zz"), None);
        assert_eq!(parse_uid(""), None);
        assert_eq!(uid_hex(&[0x04, 0xa2, 0x1b]), "04a21b");
    }

    #[test]
    fn scan_replaces_queue_and_skips() {
        let (dir, store, config) = setup();
        let queue = QueueManager::new(store.clone());
        queue
            .enqueue(&[dir.path().join("song.mp3")], EnqueueMode::Append)
            .unwrap();
        queue
            .enqueue(&[dir.path().join("song.mp3")], EnqueueMode::Append)
            .unwrap();

        let mut listener = NfcListener::new(store.clone(), &config);
        assert!(listener.handle_uid(&[0x04, 0xa2, 0x1b], Instant::now()).unwrap());

        assert_eq!(queue.len().unwrap(), 1);
        assert_eq!(store.get(keys::COMMAND).unwrap().as_deref(), Some("skip"));
    }

    #[test]
    fn same_tag_is_debounced() {
        let (_dir, store, config) = setup();
        let mut listener = NfcListener::new(store.clone(), &config);
        let uid = [0x04, 0xa2, 0x1b];
        let t0 = Instant::now();

        assert!(listener.handle_uid(&uid, t0).unwrap());
        assert!(!listener.handle_uid(&uid, t0 + Duration::from_secs(3)).unwrap());
        assert!(!listener.handle_uid(&uid, t0 + Duration::from_millis(9_999)).unwrap());
        assert!(listener.handle_uid(&uid, t0 + Duration::from_secs(10)).unwrap());
    }

    #[test]
    fn unknown_tags_still_clear_the_queue() {
        let (dir, store, config) = setup();
        let queue = QueueManager::new(store.clone());
        queue
            .enqueue(&[dir.path().join("song.mp3")], EnqueueMode::Append)
            .unwrap();

        let mut listener = NfcListener::new(store, &config);
        assert!(listener.handle_uid(&[0xff], Instant::now()).unwrap());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn listener_runs_until_the_reader_closes() {
        let (_dir, store, config) = setup();
        let reader = LineUidReader::from_reader(Cursor::new("04a21b\n\n04a21b\nnoise\n"));

        NfcListener::new(store.clone(), &config).listen(reader).unwrap();
        // the repeat read fell inside the retrigger window
        assert_eq!(QueueManager::new(store).len().unwrap(), 1);
    }

    #[test]
    fn missing_device_means_no_listener() {
        let (_dir, store, mut config) = setup();
        assert!(spawn(store.clone(), &config).is_none());
        config.device = Some(PathBuf::from("/nonexistent/nfc0"));
        assert!(spawn(store, &config).is_none());
    }
}
