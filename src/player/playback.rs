use tracing::{debug, warn};

use super::state::Player;
use crate::{common::errors::PlatformResult, platform::Platform};

async fn start_current(
    player: &mut Player,
    platform: &dyn Platform,
    position: u64,
    paused: bool,
) -> PlatformResult<()> {
    let guild_id = player.guild_id;
    let Some(track) = player.current.as_ref() else {
        return Ok(());
    };
    let position = if track.is_stream { 0 } else { position };

    match platform.start_track(guild_id, track, position, paused).await {
        Ok(()) => {
            debug!("[{}] Started {} at {}ms (paused: {})", guild_id, track.title, position, paused);
            player.begin_current(position, paused);
            Ok(())
        }
        Err(e) => {
            warn!("[{}] Failed to start {}: {}", guild_id, track.title, e);
            player.fail_current();
            Err(e)
        }
    }
}

/// Pops the queue head and starts it. Tracks the platform refuses go to
/// the failed list and the next one is tried at position 0.
pub async fn start_head(
    player: &mut Player,
    platform: &dyn Platform,
    start_position: u64,
    paused: bool,
) -> bool {
    let mut position = start_position;
    while player.take_head().is_some() {
        if start_current(player, platform, position, paused).await.is_ok() {
            return true;
        }
        position = 0;
    }
    false
}

/// Retires the finished track per loop mode and starts whatever follows.
pub async fn play_next(player: &mut Player, platform: &dyn Platform) -> bool {
    if player.advance().is_none() {
        return false;
    }
    if start_current(player, platform, 0, false).await.is_ok() {
        return true;
    }
    start_head(player, platform, 0, false).await
}
