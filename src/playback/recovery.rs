use super::player::Player;
use crate::audio::{MediaPipeline, Track};
use crate::Result;
use tracing::{info, warn};

pub const DEFAULT_VOLUME: i64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    pub volume: i64,
    pub muted: bool,
    /// the track an unclean shutdown left behind, now back at the queue head
    pub requeued: Option<Track>,
}

/// Apply the persisted volume and mute flag. Returns what was applied.
pub fn restore_volume<P: MediaPipeline>(player: &mut Player<P>) -> Result<(i64, bool)> {
    let volume = player.states().volume()?.unwrap_or(DEFAULT_VOLUME);
    let muted = player.states().muted()?.unwrap_or(false);
    player.set_volume(volume)?;
    if muted {
        player.mute()?;
    } else {
        player.unmute()?;
    }
    Ok((volume, muted))
}

/// Bring a freshly started player back to where the last one left off.
pub fn recover<P: MediaPipeline>(player: &mut Player<P>) -> Result<RecoveryReport> {
    let (volume, muted) = restore_volume(player)?;

    let requeued = match player.states().take_current_record()? {
        Some(record) => {
            player.queue().requeue_record(&record)?;
            match Track::from_record(&record) {
                Ok(track) => {
                    info!("Requeued interrupted track {}", track.file.display());
                    Some(track)
                }
                Err(e) => {
                    // still requeued; the loop reports it when it comes up
                    warn!("Interrupted track record is malformed: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    Ok(RecoveryReport {
        volume,
        muted,
        requeued,
    })
}
