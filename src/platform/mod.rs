//! Everything the core needs from the chat platform, behind one trait.
//! Command routing, embeds and the gateway protocol live with the caller.

pub mod context;
#[cfg(test)]
pub mod mock;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

pub use context::{InteractionResponse, RequestContext};

use crate::{
    common::{
        errors::PlatformResult,
        types::{BotId, ChannelId, GuildId, MessageId, UserId},
    },
    player::{NowPlaying, Track},
    snapshot::PurgeMode,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
    Stage,
    Thread,
    Forum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub kind: ChannelKind,
}

/// Effective permissions of the bot in one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelPermissions {
    pub view_channel: bool,
    pub send_messages: bool,
    pub send_in_threads: bool,
    pub connect: bool,
    pub speak: bool,
}

impl ChannelPermissions {
    pub fn all() -> Self {
        Self {
            view_channel: true,
            send_messages: true,
            send_in_threads: true,
            connect: true,
            speak: true,
        }
    }

    pub fn can_post(&self, kind: ChannelKind) -> bool {
        let send = match kind {
            ChannelKind::Thread | ChannelKind::Forum => self.send_in_threads,
            _ => self.send_messages,
        };
        self.view_channel && send
    }

    pub fn can_join(&self) -> bool {
        self.view_channel && self.connect && self.speak
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: UserId,
    /// The message owns a thread that is still open.
    pub has_live_thread: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub id: UserId,
    pub bot: bool,
}

/// Per-guild settings kept by the command layer.
#[derive(Debug, Clone, Default)]
pub struct GuildSettings {
    pub prefix: Option<String>,
    pub purge_mode: Option<PurgeMode>,
    /// Custom skin templates by skin name.
    pub custom_skins: HashMap<String, String>,
    pub custom_static_skins: HashMap<String, String>,
}

#[async_trait]
pub trait Platform: Send + Sync {
    fn bot_id(&self) -> BotId;

    async fn guild(&self, guild_id: GuildId) -> PlatformResult<GuildInfo>;

    async fn channel(&self, guild_id: GuildId, channel_id: ChannelId) -> PlatformResult<ChannelInfo>;

    async fn permissions(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlatformResult<ChannelPermissions>;

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> PlatformResult<MessageInfo>;

    /// Newest first, at most `limit` messages.
    async fn recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> PlatformResult<Vec<MessageInfo>>;

    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> PlatformResult<MessageId>;

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> PlatformResult<()>;

    async fn respond_interaction(
        &self,
        interaction_id: u64,
        token: &str,
        response: InteractionResponse,
    ) -> PlatformResult<()>;

    async fn connect_voice(&self, guild_id: GuildId, channel_id: ChannelId) -> PlatformResult<()>;

    async fn disconnect_voice(&self, guild_id: GuildId) -> PlatformResult<()>;

    /// Voice channel the bot currently sits in, as last reported by the gateway.
    async fn voice_state(&self, guild_id: GuildId) -> Option<ChannelId>;

    async fn voice_members(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlatformResult<Vec<MemberInfo>>;

    async fn start_track(
        &self,
        guild_id: GuildId,
        track: &Track,
        start_position: u64,
        paused: bool,
    ) -> PlatformResult<()>;

    /// Draws the controller message; returns the id of the message now
    /// holding it, which may differ from `message_id`.
    async fn render_controller(
        &self,
        channel_id: ChannelId,
        message_id: Option<MessageId>,
        now_playing: &NowPlaying,
    ) -> PlatformResult<Option<MessageId>>;

    async fn guild_settings(&self, guild_id: GuildId) -> PlatformResult<GuildSettings>;

    /// Token a user registered for rich presence, if any.
    async fn rpc_token(&self, user_id: UserId) -> Option<String>;

    /// Best-effort message; failures are only logged.
    async fn send_notice(&self, channel_id: ChannelId, content: &str) {
        if let Err(e) = self.send_message(channel_id, content, None).await {
            tracing::debug!("Notice to channel {} dropped: {}", channel_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_posting_needs_thread_permission() {
        let perms = ChannelPermissions {
            send_in_threads: false,
            ..ChannelPermissions::all()
        };
        assert!(perms.can_post(ChannelKind::Text));
        assert!(!perms.can_post(ChannelKind::Thread));
    }

    #[test]
    fn joining_needs_connect_and_speak() {
        let perms = ChannelPermissions {
            speak: false,
            ..ChannelPermissions::all()
        };
        assert!(!perms.can_join());
        assert!(ChannelPermissions::all().can_join());
        assert!(!ChannelPermissions::default().can_post(ChannelKind::Text));
    }
}
