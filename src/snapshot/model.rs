use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    common::types::{ChannelId, GuildId, MessageId, UserId},
    snapshot::schema::SNAPSHOT_VERSION,
};

/// Name and URL of the playlist a track was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub name: String,
    pub url: String,
}

/// Minimal description of a playable item as persisted in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Unique within a player; used for de-duplication and index lookups.
    pub id: uuid::Uuid,
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub is_stream: bool,
    pub requester: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<PlaylistRef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

/// Which messages the player deletes from its request channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeMode {
    #[default]
    Off,
    OnMessage,
    OnPlayerStart,
    OnPlayerStop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub version: u32,
    pub guild_id: GuildId,
    pub volume: u16,
    #[serde(default)]
    pub nightcore: bool,
    /// Position inside the head track of `queue`, in milliseconds.
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub paused: bool,
    pub voice_channel_id: ChannelId,
    #[serde(default)]
    pub text_channel_id: Option<ChannelId>,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub static_mode: bool,
    #[serde(default)]
    pub dj: BTreeSet<UserId>,
    pub creator: UserId,
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default)]
    pub keep_connected: bool,
    #[serde(default)]
    pub purge_mode: PurgeMode,
    #[serde(default)]
    pub skin: String,
    #[serde(default)]
    pub static_skin: String,
    #[serde(default)]
    pub custom_skin: Option<String>,
    #[serde(default)]
    pub custom_static_skin: Option<String>,
    /// Current track first, then the pending queue.
    #[serde(default)]
    pub queue: Vec<TrackRecord>,
    #[serde(default)]
    pub history: Vec<TrackRecord>,
    #[serde(default)]
    pub autoplay_queue: Vec<TrackRecord>,
    #[serde(default)]
    pub failed_tracks: Vec<TrackRecord>,
    #[serde(default)]
    pub prefix_info: Option<String>,
    #[serde(default)]
    pub voice_state: Option<serde_json::Value>,
    pub saved_at: u64,
}

impl PlayerSnapshot {
    /// An empty snapshot at the current schema version.
    pub fn new(guild_id: GuildId, voice_channel_id: ChannelId, creator: UserId) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            guild_id,
            volume: 100,
            nightcore: false,
            position: 0,
            paused: false,
            voice_channel_id,
            text_channel_id: None,
            message_id: None,
            static_mode: false,
            dj: BTreeSet::new(),
            creator,
            loop_mode: LoopMode::Off,
            autoplay: false,
            keep_connected: false,
            purge_mode: PurgeMode::Off,
            skin: "default".to_string(),
            static_skin: "default".to_string(),
            custom_skin: None,
            custom_static_skin: None,
            queue: Vec::new(),
            history: Vec::new(),
            autoplay_queue: Vec::new(),
            failed_tracks: Vec::new(),
            prefix_info: None,
            voice_state: None,
            saved_at: 0,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.saved_at)
    }

    /// Clamps the stored position into the head track's duration.
    pub fn normalize(&mut self) {
        match self.queue.first() {
            Some(head) if head.is_stream => self.position = 0,
            Some(head) => self.position = self.position.min(head.duration_ms),
            None => self.position = 0,
        }
    }
}
