// Single-line playback status, redrawn in place every tick.
// Pure formatting: everything comes from pipeline queries and stored volume/mute.

use std::time::Duration;

const SPINNER: [char; 10] = ['⠇', '⠏', '⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧'];
const VOLUME_BAR_WIDTH: usize = 10;
const PROGRESS_BAR_WIDTH: usize = 44;

#[derive(Debug, Default)]
pub struct Spinner {
    index: usize,
}

impl Spinner {
    pub fn next_frame(&mut self) -> char {
        let frame = SPINNER[self.index % SPINNER.len()];
        self.index = self.index.wrapping_add(1);
        frame
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub glyph: char,
    /// 0..=1000
    pub volume: i64,
    pub muted: bool,
    pub position: Option<Duration>,
    pub duration: Option<Duration>,
}

//   ▶  [==========]   00:04 [______V_____________________________________] 00:31
pub fn render(view: &StatusView, terminal_width: u16) -> String {
    let width = if terminal_width > 80 {
        usize::from(terminal_width) - 36
    } else {
        PROGRESS_BAR_WIDTH
    };

    let (position_time, duration_time, progress_bar) = match (view.position, view.duration) {
        (Some(position), Some(duration)) if !duration.is_zero() => {
            let fraction = (position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
            let progress = ((fraction * width as f64) as usize).min(width);
            let mut bar = "_".repeat(progress.saturating_sub(1));
            bar.push('V');
            (
                minutes_seconds(position),
                minutes_seconds(duration),
                pad_right(bar, width, '_'),
            )
        }
        // nothing loaded yet, no clock
        _ => ("--:--".to_string(), "--:--".to_string(), "_".repeat(width)),
    };

    format!(
        "  {}  [{}]   {} [{}] {}",
        view.glyph,
        volume_bar(view.volume, view.muted),
        position_time,
        progress_bar,
        duration_time
    )
}

fn volume_bar(volume: i64, muted: bool) -> String {
    let filled = ((volume.clamp(0, 1000) as f64 / 100.0).round() as usize).min(VOLUME_BAR_WIDTH);
    let bar = pad_right("=".repeat(filled), VOLUME_BAR_WIDTH, ' ');
    if muted {
        format!("{} XX {}", &bar[0..3], &bar[7..10])
    } else {
        bar
    }
}

fn pad_right(mut text: String, width: usize, fill: char) -> String {
    let len = text.chars().count();
    text.extend(std::iter::repeat(fill).take(width.saturating_sub(len)));
    text
}

pub fn minutes_seconds(t: Duration) -> String {
    let secs = t.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
