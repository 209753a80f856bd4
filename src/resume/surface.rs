use tracing::debug;

use crate::{
    common::types::{ChannelId, GuildId, MessageId},
    platform::Platform,
    snapshot::PlayerSnapshot,
};

/// Where a resumed player posts its controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSurface {
    pub channel_id: ChannelId,
    pub message_id: Option<MessageId>,
    pub static_mode: bool,
    /// The stored text channel was unusable and the voice channel took over.
    pub fell_back: bool,
}

pub async fn resolve(platform: &dyn Platform, snapshot: &PlayerSnapshot, lookback: usize) -> TextSurface {
    let guild_id = snapshot.guild_id;

    let usable = match snapshot.text_channel_id {
        Some(channel_id) => can_post(platform, guild_id, channel_id).await,
        None => false,
    };
    let Some(channel_id) = snapshot.text_channel_id.filter(|_| usable) else {
        debug!("[{}] Text channel unusable, controller moves to the voice channel", guild_id);
        return TextSurface {
            channel_id: snapshot.voice_channel_id,
            message_id: None,
            static_mode: false,
            fell_back: true,
        };
    };

    let message_id = find_controller(
        platform,
        channel_id,
        snapshot.message_id,
        snapshot.static_mode,
        lookback,
    )
    .await;

    TextSurface {
        channel_id,
        message_id,
        static_mode: snapshot.static_mode,
        fell_back: false,
    }
}

async fn can_post(platform: &dyn Platform, guild_id: GuildId, channel_id: ChannelId) -> bool {
    let Ok(channel) = platform.channel(guild_id, channel_id).await else {
        return false;
    };
    platform
        .permissions(guild_id, channel_id)
        .await
        .is_ok_and(|perms| perms.can_post(channel.kind))
}

/// Stored controller message if it still exists, otherwise the newest bot
/// message in recent history that still has a live thread.
pub async fn find_controller(
    platform: &dyn Platform,
    channel_id: ChannelId,
    stored: Option<MessageId>,
    static_mode: bool,
    lookback: usize,
) -> Option<MessageId> {
    match stored {
        Some(message_id) => match platform.fetch_message(channel_id, message_id).await {
            Ok(_) => return Some(message_id),
            Err(e) => debug!("Controller message {} gone: {}", message_id, e),
        },
        None if !static_mode => return None,
        None => {}
    }

    let bot_id = platform.bot_id();
    match platform.recent_messages(channel_id, lookback).await {
        Ok(messages) => messages
            .into_iter()
            .find(|m| m.author == bot_id && m.has_live_thread)
            .map(|m| m.id),
        Err(e) => {
            debug!("History scan of channel {} failed: {}", channel_id, e);
            None
        }
    }
}
