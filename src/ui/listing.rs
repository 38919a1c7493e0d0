// Read-only views of the queue, the history and the current track,
// as printed by show-queue, show-previous, show-playing and show-summary.

use crate::audio::Track;
use crate::playback::{PlayerState, QueueManager, StateStore};
use crate::Result;
use crossterm::{cursor, execute, terminal};
use std::io::Write;
use std::thread;
use std::time::Duration;

const FALLBACK_SIZE: (u16, u16) = (80, 24);

/// Truncate with an ellipsis, then pad, so columns line up.
pub fn shorten(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len > width {
        let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
        short.push('…');
        short
    } else {
        format!("{text:<width$}")
    }
}

/// `{flag} {title} | {nn}/{nn} {album} | {artist}`, fitted to `width` columns
pub fn format_track_text(track: &Track, flag: char, width: u16) -> String {
    let avail = usize::from(width).saturating_sub(14);
    let title_width = (avail as f64 * 0.4).round() as usize;
    let rest = avail - title_width;
    let album_width = (rest as f64 * 0.5).round() as usize;
    let artist_width = rest - album_width;
    let (num, total) = track.track_numbers();

    format!(
        "{flag} {} | {num:02}/{total:02} {} | {}",
        shorten(track.display_title(), title_width),
        shorten(track.display_album(), album_width),
        shorten(track.display_artist(), artist_width),
    )
}

/// Flag for the current track as another process sees it
pub fn state_flag(state: Option<PlayerState>) -> char {
    match state {
        Some(PlayerState::Playing) => '▶',
        Some(PlayerState::Paused) => '‖',
        _ => '◼',
    }
}

pub struct Listing {
    queue: QueueManager,
    states: StateStore,
    width: u16,
    height: u16,
}

impl Listing {
    pub fn new(queue: QueueManager, states: StateStore) -> Self {
        let (width, height) = terminal::size().unwrap_or(FALLBACK_SIZE);
        Self::with_size(queue, states, width, height)
    }

    pub fn with_size(queue: QueueManager, states: StateStore, width: u16, height: u16) -> Self {
        Self {
            queue,
            states,
            width,
            height,
        }
    }

    fn refresh_size(&mut self) {
        if let Ok((width, height)) = terminal::size() {
            self.width = width;
            self.height = height;
        }
    }

    pub fn write_queue<W: Write>(&self, out: &mut W, count: i64) -> Result<()> {
        for track in self.queue.peek_range(count)? {
            writeln!(out, "{}", format_track_text(&track, ' ', self.width))?;
        }
        Ok(())
    }

    /// History, oldest first so the newest sits just above the current track
    pub fn write_previous<W: Write>(&self, out: &mut W, count: i64) -> Result<()> {
        for track in self.queue.peek_recent(count)?.iter().rev() {
            writeln!(out, "{}", format_track_text(track, ' ', self.width))?;
        }
        Ok(())
    }

    pub fn write_playing<W: Write>(&self, out: &mut W) -> Result<()> {
        match self.states.current_track()? {
            Some(track) => {
                // an unknown stored state just means no play/pause flag
                let flag = state_flag(self.states.stored_state().ok().flatten());
                writeln!(out, "{}", format_track_text(&track, flag, self.width))?;
            }
            None => writeln!(out, "◼ [nothing playing]")?,
        }
        Ok(())
    }

    pub fn write_summary<W: Write>(&self, out: &mut W) -> Result<()> {
        let half = i64::from(self.height / 2);
        // a non-positive history count would mean "everything"
        let history = half - 2;
        if history > 0 {
            self.write_previous(out, history)?;
        }
        self.write_playing(out)?;
        if half > 0 {
            self.write_queue(out, half)?;
        }
        Ok(())
    }

    /// Render once, or every `every_secs` seconds forever on a cleared screen.
    pub fn repeat<W, F>(&mut self, out: &mut W, every_secs: u64, mut render: F) -> Result<()>
    where
        W: Write,
        F: FnMut(&Self, &mut W) -> Result<()>,
    {
        render(self, out)?;
        out.flush()?;
        if every_secs == 0 {
            return Ok(());
        }
        loop {
            thread::sleep(Duration::from_secs(every_secs));
            self.refresh_size();
            execute!(
                out,
                terminal::Clear(terminal::ClearType::All),
                cursor::MoveTo(0, 0)
            )?;
            render(self, out)?;
            out.flush()?;
        }
    }
}
