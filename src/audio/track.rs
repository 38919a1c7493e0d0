use super::{AudioFormat, MediaKind};
use crate::{Error, Result};
use id3::TagLike;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// One playable file plus whatever tags could be read when it was enqueued.
/// This is exactly the JSON record stored in the queue lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub file: PathBuf,
    #[serde(default)]
    pub tags: TrackTags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackTags {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub track: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub track_total: Option<String>,
    /// seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Fields written by other taggers, kept so records survive a round trip
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A finished play waiting for the scrobbler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrobbleRecord {
    #[serde(flatten)]
    pub track: Track,
    /// unix epoch seconds when playback started
    pub started: f64,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            )))
        }
    })
}

impl Track {
    pub fn new(file: PathBuf, tags: TrackTags) -> Self {
        Self { file, tags }
    }

    /// Resolve `path` to its canonical location and read its tags.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = fs::canonicalize(path).map_err(|_| Error::MissingFile(path.to_path_buf()))?;
        let format = match MediaKind::guess(&file) {
            MediaKind::Audio(format) => format,
            _ => return Err(Error::UnsupportedFile(path.to_path_buf())),
        };
        let tags = TrackTags::read(&file, format);
        Ok(Self { file, tags })
    }

    pub fn from_record(record: &str) -> Result<Self> {
        Ok(serde_json::from_str(record)?)
    }

    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn display_title(&self) -> &str {
        self.tags.title.as_deref().unwrap_or("Unknown Track")
    }

    pub fn display_artist(&self) -> &str {
        self.tags.artist.as_deref().unwrap_or("Unknown Artist")
    }

    pub fn display_album(&self) -> &str {
        self.tags.album.as_deref().unwrap_or("Unknown Album")
    }

    /// (track, total); both fall back to 1 when either is missing or garbage
    pub fn track_numbers(&self) -> (u32, u32) {
        fn parse(value: Option<&str>) -> Option<u32> {
            let value = value?.trim();
            let leading = value.split('/').next().unwrap_or(value);
            leading.trim().parse().ok()
        }

        match (
            parse(self.tags.track.as_deref()),
            parse(self.tags.track_total.as_deref()),
        ) {
            (Some(num), Some(total)) => (num, total),
            _ => (1, 1),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.tags
            .duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn exists(&self) -> bool {
        self.file.is_file()
    }
}

impl ScrobbleRecord {
    pub fn from_record(record: &str) -> Result<Self> {
        Ok(serde_json::from_str(record)?)
    }

    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl TrackTags {
    /// Best-effort tag read. Never fails: whatever cannot be read stays None,
    /// and a missing title falls back to the file stem.
    pub fn read(path: &Path, format: AudioFormat) -> Self {
        let mut tags = match format {
            AudioFormat::Mp3 => Self::from_id3(path),
            AudioFormat::Mp4 => Self::from_mp4(path),
            _ => None,
        }
        .unwrap_or_default();

        if tags.title.is_none() {
            tags.title = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(|s| s.to_string());
        }
        tags
    }

    fn from_id3(path: &Path) -> Option<Self> {
        let tag = id3::Tag::read_from_path(path)
            .map_err(|e| debug!("No id3 tag in {}: {}", path.display(), e))
            .ok()?;

        Some(Self {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            track: tag.track().map(|n| n.to_string()),
            track_total: tag.total_tracks().map(|n| n.to_string()),
            duration: tag.duration().map(|ms| f64::from(ms) / 1000.0),
            extra: Map::new(),
        })
    }

    fn from_mp4(path: &Path) -> Option<Self> {
        let tag = mp4ameta::Tag::read_from_path(path)
            .map_err(|e| debug!("No mp4 tag in {}: {}", path.display(), e))
            .ok()?;

        Some(Self {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            track: tag.track_number().map(|n| n.to_string()),
            track_total: tag.total_tracks().map(|n| n.to_string()),
            duration: tag.duration().map(|d| d.as_secs_f64()),
            extra: Map::new(),
        })
    }
}
