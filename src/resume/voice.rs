use std::time::Duration;

use tracing::debug;

use crate::{
    common::{
        errors::{PlayerError, PlayerResult},
        types::{ChannelId, GuildId},
    },
    configs::PlayerConfig,
    platform::Platform,
};

/// Joins the voice channel and polls until the platform reports the bot in
/// voice. Without a configured deadline this waits indefinitely.
pub async fn join_and_confirm(
    platform: &dyn Platform,
    guild_id: GuildId,
    channel_id: ChannelId,
    config: &PlayerConfig,
) -> PlayerResult<()> {
    platform.connect_voice(guild_id, channel_id).await?;

    let poll = Duration::from_millis(config.voice_poll_interval_ms.max(10));
    let confirmed = async {
        while platform.voice_state(guild_id).await.is_none() {
            debug!("[{}] Waiting for voice state", guild_id);
            tokio::time::sleep(poll).await;
        }
    };

    match config.voice_confirm_timeout_ms {
        Some(deadline) => tokio::time::timeout(Duration::from_millis(deadline), confirmed)
            .await
            .map_err(|_| PlayerError::VoiceTimeout(deadline)),
        None => {
            confirmed.await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::types::UserId, platform::mock::MockPlatform};

    #[tokio::test(start_paused = true)]
    async fn confirmation_arriving_later_is_awaited() {
        let platform = std::sync::Arc::new(MockPlatform::new(UserId(1), GuildId(2)));
        platform.set_confirm_voice(false);

        let late = platform.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            late.set_voice_state(GuildId(2), Some(ChannelId(3)));
        });

        join_and_confirm(platform.as_ref(), GuildId(2), ChannelId(3), &PlayerConfig::default())
            .await
            .unwrap();
        assert_eq!(platform.connects(), vec![(GuildId(2), ChannelId(3))]);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_deadline_bounds_the_wait() {
        let platform = MockPlatform::new(UserId(1), GuildId(2));
        platform.set_confirm_voice(false);
        let config = PlayerConfig {
            voice_confirm_timeout_ms: Some(3_000),
            ..PlayerConfig::default()
        };

        let result = join_and_confirm(&platform, GuildId(2), ChannelId(3), &config).await;
        assert!(matches!(result, Err(PlayerError::VoiceTimeout(3_000))));
    }
}
