use super::{MediaKind, Track};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::ffi::OsString;
use std::io::BufRead;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueMode {
    Append,
    Prepend,
}

/// Result of expanding user-supplied paths: the tracks in intended play
/// order, plus every path that could not be used and why.
#[derive(Debug, Default)]
pub struct Resolution {
    pub tracks: Vec<Track>,
    pub failures: Vec<(PathBuf, Error)>,
}

/// Turns files, directories, playlists and stdin listings into Tracks.
#[derive(Clone, Default)]
pub struct PathResolver;

impl PathResolver {
    pub fn new() -> Self {
        Self
    }

    /// Expand `paths`. A lone leading `-` means "read the list from `stdin`".
    /// Listed lines are taken as raw bytes, so names that are not UTF-8 still
    /// resolve; a failed read is reported and the rest of the list is kept.
    pub fn resolve_with_stdin<R: BufRead>(&self, paths: &[PathBuf], stdin: R) -> Resolution {
        if !paths.first().is_some_and(|p| p.as_os_str() == "-") {
            return self.resolve(paths);
        }

        let mut listed = Vec::new();
        let mut unreadable = Vec::new();
        for line in stdin.split(b'\n') {
            match line {
                Ok(mut bytes) => {
                    while bytes.last().is_some_and(u8::is_ascii_whitespace) {
                        bytes.pop();
                    }
                    if !bytes.is_empty() {
                        listed.push(PathBuf::from(OsString::from_vec(bytes)));
                    }
                }
                Err(e) => unreadable.push((PathBuf::from("-"), Error::Io(e))),
            }
        }

        let mut resolution = self.resolve(&listed);
        resolution.failures.extend(unreadable);
        resolution
    }

    pub fn resolve(&self, paths: &[PathBuf]) -> Resolution {
        let mut resolution = Resolution::default();
        // playlists currently being expanded; only guards against cycles
        let mut playlists = HashSet::new();
        for path in paths {
            self.resolve_path(path, &mut resolution, &mut playlists);
        }
        resolution
    }

    fn resolve_path(&self, path: &Path, out: &mut Resolution, playlists: &mut HashSet<PathBuf>) {
        if path.is_dir() {
            self.resolve_directory(path, out, playlists);
            return;
        }

        match MediaKind::guess(path) {
            MediaKind::Playlist => {
                if let Err(e) = self.resolve_playlist(path, out, playlists) {
                    out.failures.push((path.to_path_buf(), e));
                }
            }
            _ => match Track::from_path(path) {
                Ok(track) => out.tracks.push(track),
                Err(e) => out.failures.push((path.to_path_buf(), e)),
            },
        }
    }

    fn resolve_directory(&self, dir: &Path, out: &mut Resolution, playlists: &mut HashSet<PathBuf>) {
        // files before subdirectories, each group sorted, depth first
        let walker = WalkDir::new(dir).follow_links(true).sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                    out.failures.push((path, Error::Io(e.into())));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            // Skip hidden files (dotfiles)
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'))
            {
                continue;
            }

            match MediaKind::guess(path) {
                MediaKind::Unsupported => debug!("Skipping non-media file {}", path.display()),
                _ => self.resolve_path(path, out, playlists),
            }
        }
    }

    fn resolve_playlist(
        &self,
        playlist: &Path,
        out: &mut Resolution,
        playlists: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        let canonical =
            fs::canonicalize(playlist).map_err(|_| Error::MissingFile(playlist.to_path_buf()))?;
        let content = fs::read_to_string(&canonical)?;
        if !playlists.insert(canonical.clone()) {
            debug!("Playlist {} includes itself, skipping", canonical.display());
            return Ok(());
        }

        let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        for entry in parse_playlist(&content) {
            let entry = PathBuf::from(entry);
            let target = if entry.is_absolute() { entry } else { base.join(entry) };
            self.resolve_path(&target, out, playlists);
        }
        playlists.remove(&canonical);
        Ok(())
    }
}

/// Entries of an m3u playlist: every non-blank line that is not a `#` comment
pub fn parse_playlist(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}
