//! Scripted platform for tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ChannelInfo, ChannelKind, ChannelPermissions, GuildInfo, GuildSettings, InteractionResponse,
    MemberInfo, MessageInfo, Platform,
};
use crate::{
    common::{
        errors::{PlatformError, PlatformResult},
        types::{BotId, ChannelId, GuildId, MessageId, UserId},
    },
    player::{NowPlaying, Track},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub content: String,
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub guild_id: GuildId,
    pub title: String,
    pub position: u64,
    pub paused: bool,
}

#[derive(Default)]
struct MockState {
    guilds: HashSet<GuildId>,
    channels: HashMap<ChannelId, (GuildId, ChannelKind)>,
    permissions: HashMap<ChannelId, ChannelPermissions>,
    /// Oldest first.
    messages: HashMap<ChannelId, Vec<MessageInfo>>,
    members: HashMap<ChannelId, Vec<MemberInfo>>,
    voice: HashMap<GuildId, ChannelId>,
    confirm_voice: bool,
    fail_disconnect: bool,
    failing_titles: HashSet<String>,
    settings: GuildSettings,
    tokens: HashMap<UserId, String>,
    next_id: u64,

    sent: Vec<Sent>,
    edits: Vec<(ChannelId, MessageId, String)>,
    interactions: Vec<(u64, InteractionResponse)>,
    started: Vec<Started>,
    connects: Vec<(GuildId, ChannelId)>,
    disconnects: Vec<GuildId>,
    controllers: Vec<(ChannelId, Option<MessageId>)>,
}

pub struct MockPlatform {
    bot_id: BotId,
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new(bot_id: BotId, guild_id: GuildId) -> Self {
        let state = MockState {
            guilds: HashSet::from([guild_id]),
            confirm_voice: true,
            next_id: 1_000,
            ..Default::default()
        };
        Self {
            bot_id,
            state: Mutex::new(state),
        }
    }

    pub fn add_channel(&self, guild_id: GuildId, channel_id: ChannelId, kind: ChannelKind) {
        self.state.lock().channels.insert(channel_id, (guild_id, kind));
    }

    pub fn remove_channel(&self, channel_id: ChannelId) {
        self.state.lock().channels.remove(&channel_id);
    }

    pub fn remove_guild(&self, guild_id: GuildId) {
        self.state.lock().guilds.remove(&guild_id);
    }

    pub fn set_permissions(&self, channel_id: ChannelId, permissions: ChannelPermissions) {
        self.state.lock().permissions.insert(channel_id, permissions);
    }

    pub fn add_message(&self, message: MessageInfo) {
        self.state
            .lock()
            .messages
            .entry(message.channel_id)
            .or_default()
            .push(message);
    }

    pub fn set_members(&self, channel_id: ChannelId, members: Vec<MemberInfo>) {
        self.state.lock().members.insert(channel_id, members);
    }

    /// When false, joining never shows up in the voice state.
    pub fn set_confirm_voice(&self, confirm: bool) {
        self.state.lock().confirm_voice = confirm;
    }

    pub fn set_voice_state(&self, guild_id: GuildId, channel_id: Option<ChannelId>) {
        let mut state = self.state.lock();
        match channel_id {
            Some(channel_id) => state.voice.insert(guild_id, channel_id),
            None => state.voice.remove(&guild_id),
        };
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.state.lock().fail_disconnect = fail;
    }

    pub fn fail_track(&self, title: &str) {
        self.state.lock().failing_titles.insert(title.to_string());
    }

    pub fn set_settings(&self, settings: GuildSettings) {
        self.state.lock().settings = settings;
    }

    pub fn set_token(&self, user_id: UserId, token: &str) {
        self.state.lock().tokens.insert(user_id, token.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().sent.clone()
    }

    pub fn edits(&self) -> Vec<(ChannelId, MessageId, String)> {
        self.state.lock().edits.clone()
    }

    pub fn interactions(&self) -> Vec<(u64, InteractionResponse)> {
        self.state.lock().interactions.clone()
    }

    pub fn started(&self) -> Vec<Started> {
        self.state.lock().started.clone()
    }

    pub fn connects(&self) -> Vec<(GuildId, ChannelId)> {
        self.state.lock().connects.clone()
    }

    pub fn disconnects(&self) -> Vec<GuildId> {
        self.state.lock().disconnects.clone()
    }

    pub fn controllers(&self) -> Vec<(ChannelId, Option<MessageId>)> {
        self.state.lock().controllers.clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn bot_id(&self) -> BotId {
        self.bot_id
    }

    async fn guild(&self, guild_id: GuildId) -> PlatformResult<GuildInfo> {
        if self.state.lock().guilds.contains(&guild_id) {
            Ok(GuildInfo {
                id: guild_id,
                name: format!("guild-{guild_id}"),
            })
        } else {
            Err(PlatformError::GuildNotFound(guild_id))
        }
    }

    async fn channel(&self, guild_id: GuildId, channel_id: ChannelId) -> PlatformResult<ChannelInfo> {
        match self.state.lock().channels.get(&channel_id) {
            Some(&(owner, kind)) if owner == guild_id => Ok(ChannelInfo {
                id: channel_id,
                guild_id,
                kind,
            }),
            _ => Err(PlatformError::ChannelNotFound(channel_id)),
        }
    }

    async fn permissions(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlatformResult<ChannelPermissions> {
        Ok(self
            .state
            .lock()
            .permissions
            .get(&channel_id)
            .copied()
            .unwrap_or_else(ChannelPermissions::all))
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> PlatformResult<MessageInfo> {
        self.state
            .lock()
            .messages
            .get(&channel_id)
            .and_then(|messages| messages.iter().find(|m| m.id == message_id))
            .cloned()
            .ok_or(PlatformError::MessageNotFound(message_id))
    }

    async fn recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> PlatformResult<Vec<MessageInfo>> {
        Ok(self
            .state
            .lock()
            .messages
            .get(&channel_id)
            .map(|messages| messages.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> PlatformResult<MessageId> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = MessageId(state.next_id);
        state.sent.push(Sent {
            id,
            channel_id,
            content: content.to_string(),
            reply_to,
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> PlatformResult<()> {
        self.state
            .lock()
            .edits
            .push((channel_id, message_id, content.to_string()));
        Ok(())
    }

    async fn respond_interaction(
        &self,
        interaction_id: u64,
        _token: &str,
        response: InteractionResponse,
    ) -> PlatformResult<()> {
        self.state.lock().interactions.push((interaction_id, response));
        Ok(())
    }

    async fn connect_voice(&self, guild_id: GuildId, channel_id: ChannelId) -> PlatformResult<()> {
        let mut state = self.state.lock();
        state.connects.push((guild_id, channel_id));
        if state.confirm_voice {
            state.voice.insert(guild_id, channel_id);
        }
        Ok(())
    }

    async fn disconnect_voice(&self, guild_id: GuildId) -> PlatformResult<()> {
        let mut state = self.state.lock();
        state.disconnects.push(guild_id);
        if state.fail_disconnect {
            return Err(PlatformError::Transport("gateway closed".into()));
        }
        state.voice.remove(&guild_id);
        Ok(())
    }

    async fn voice_state(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.state.lock().voice.get(&guild_id).copied()
    }

    async fn voice_members(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlatformResult<Vec<MemberInfo>> {
        Ok(self
            .state
            .lock()
            .members
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn start_track(
        &self,
        guild_id: GuildId,
        track: &Track,
        start_position: u64,
        paused: bool,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock();
        if state.failing_titles.contains(&track.title) {
            return Err(PlatformError::Transport(format!("cannot load {}", track.title)));
        }
        state.started.push(Started {
            guild_id,
            title: track.title.clone(),
            position: start_position,
            paused,
        });
        Ok(())
    }

    async fn render_controller(
        &self,
        channel_id: ChannelId,
        message_id: Option<MessageId>,
        _now_playing: &NowPlaying,
    ) -> PlatformResult<Option<MessageId>> {
        let mut state = self.state.lock();
        state.controllers.push((channel_id, message_id));
        let id = match message_id {
            Some(id) => id,
            None => {
                state.next_id += 1;
                MessageId(state.next_id)
            }
        };
        Ok(Some(id))
    }

    async fn guild_settings(&self, _guild_id: GuildId) -> PlatformResult<GuildSettings> {
        Ok(self.state.lock().settings.clone())
    }

    async fn rpc_token(&self, user_id: UserId) -> Option<String> {
        self.state.lock().tokens.get(&user_id).cloned()
    }
}
