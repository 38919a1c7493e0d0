pub mod pipeline;
#[cfg(feature = "audio")]
pub mod player;
pub mod scanner;
pub mod track;

pub use pipeline::{MediaPipeline, MessageHandler, PipelineMessage, PipelineState};
#[cfg(feature = "audio")]
pub use player::RodioPipeline;
pub use scanner::{EnqueueMode, PathResolver};
pub use track::{ScrobbleRecord, Track, TrackTags};

use std::path::Path;

/// What a path turns into when it is enqueued, guessed from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Playlist,
    Audio(AudioFormat),
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Ogg,
    Mp4,
    Wav,
    Other,
}

impl MediaKind {
    pub fn guess(path: &Path) -> Self {
        let Some(mime) = mime_guess::from_path(path).first() else {
            return MediaKind::Unsupported;
        };

        if mime.subtype().as_str().to_ascii_lowercase().ends_with("mpegurl") {
            MediaKind::Playlist
        } else if mime.type_() == mime_guess::mime::AUDIO {
            let format = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(AudioFormat::from_extension)
                .unwrap_or(AudioFormat::Other);
            MediaKind::Audio(format)
        } else {
            MediaKind::Unsupported
        }
    }
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            "mp4" | "m4a" | "aac" => AudioFormat::Mp4,
            "wav" => AudioFormat::Wav,
            _ => AudioFormat::Other,
        }
    }
}
