use serde::Serialize;

use crate::{
    common::types::{BotId, GuildId, UserId},
    player::NowPlaying,
    resume::ResumeOutcome,
};

/// A listener that should see the now-playing state in rich presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcListener {
    pub user_id: UserId,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcPayload {
    pub listeners: Vec<RpcListener>,
    pub now_playing: NowPlaying,
}

/// Notifications from the core to whoever drives the bots.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    PlayerDestroyed {
        bot_id: BotId,
        guild_id: GuildId,
        reason: String,
    },
    TrackEndedWithEmptyQueue {
        bot_id: BotId,
        guild_id: GuildId,
    },
    PeriodicTick {
        bot_id: BotId,
        guild_id: GuildId,
    },
    ResumeComplete {
        bot_id: BotId,
        guild_id: GuildId,
        outcome: ResumeOutcome,
    },
    RpcUpdate {
        bot_id: BotId,
        guild_id: GuildId,
        payload: RpcPayload,
    },
}

impl PoolEvent {
    pub fn bot_id(&self) -> BotId {
        match self {
            Self::PlayerDestroyed { bot_id, .. }
            | Self::TrackEndedWithEmptyQueue { bot_id, .. }
            | Self::PeriodicTick { bot_id, .. }
            | Self::ResumeComplete { bot_id, .. }
            | Self::RpcUpdate { bot_id, .. } => *bot_id,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::PlayerDestroyed { guild_id, .. }
            | Self::TrackEndedWithEmptyQueue { guild_id, .. }
            | Self::PeriodicTick { guild_id, .. }
            | Self::ResumeComplete { guild_id, .. }
            | Self::RpcUpdate { guild_id, .. } => *guild_id,
        }
    }
}
