use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
};

use serde::Serialize;
use tokio::time::Instant;

use super::{
    tasks::BackgroundTasks,
    track::{PlaylistCache, Track},
};
use crate::{
    common::{
        errors::{PlayerError, PlayerResult},
        types::{BotId, ChannelId, GuildId, MessageId, UserId, now_ms},
    },
    snapshot::{LoopMode, PlayerSnapshot, PurgeMode, SNAPSHOT_VERSION},
};

pub const MAX_VOLUME: u16 = 1000;

/// What the controller message and rich presence show.
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub guild_id: GuildId,
    pub bot_id: BotId,
    pub track: Option<Track>,
    pub position: u64,
    pub paused: bool,
    pub volume: u16,
    pub loop_mode: LoopMode,
    pub queue_len: usize,
    pub voice_channel_id: ChannelId,
}

/// Live per-guild player.
pub struct Player {
    pub guild_id: GuildId,
    pub bot_id: BotId,
    pub volume: u16,
    pub nightcore: bool,
    pub paused: bool,

    pub current: Option<Track>,
    pub queue: VecDeque<Track>,
    pub history: VecDeque<Track>,
    pub autoplay_queue: VecDeque<Track>,
    pub failed_tracks: VecDeque<Track>,

    pub voice_channel_id: ChannelId,
    pub text_channel_id: ChannelId,
    pub message_id: Option<MessageId>,
    pub static_mode: bool,

    pub dj: BTreeSet<UserId>,
    pub creator: UserId,
    pub loop_mode: LoopMode,
    pub autoplay: bool,
    pub keep_connected: bool,
    pub purge_mode: PurgeMode,
    pub skin: String,
    pub static_skin: String,
    pub custom_skin: Option<String>,
    pub custom_static_skin: Option<String>,
    pub prefix_info: Option<String>,
    pub voice_state: Option<serde_json::Value>,

    pub tasks: BackgroundTasks,
    pub max_history: usize,
    /// Serializes snapshot writes of this player.
    pub(crate) save_guard: Arc<tokio::sync::Mutex<()>>,

    position: u64,
    playing_since: Option<Instant>,
}

impl Player {
    pub fn new(
        guild_id: GuildId,
        bot_id: BotId,
        voice_channel_id: ChannelId,
        text_channel_id: ChannelId,
        creator: UserId,
    ) -> Self {
        Self {
            guild_id,
            bot_id,
            volume: 100,
            nightcore: false,
            paused: false,
            current: None,
            queue: VecDeque::new(),
            history: VecDeque::new(),
            autoplay_queue: VecDeque::new(),
            failed_tracks: VecDeque::new(),
            voice_channel_id,
            text_channel_id,
            message_id: None,
            static_mode: false,
            dj: BTreeSet::from([creator]),
            creator,
            loop_mode: LoopMode::Off,
            autoplay: false,
            keep_connected: false,
            purge_mode: PurgeMode::Off,
            skin: "default".to_string(),
            static_skin: "default".to_string(),
            custom_skin: None,
            custom_static_skin: None,
            prefix_info: None,
            voice_state: None,
            tasks: BackgroundTasks::default(),
            max_history: 20,
            save_guard: Arc::new(tokio::sync::Mutex::new(())),
            position: 0,
            playing_since: None,
        }
    }

    /// Rebuilds a player from a stored snapshot.
    ///
    /// Every track lands in `queue` (the stored head included); tracks that
    /// share a playlist URL share one playlist. With `keep_connected` and an
    /// empty queue, the queue is refilled from the failed tracks in reverse
    /// or, failing that, from the history, which is then cleared.
    pub fn from_snapshot(
        bot_id: BotId,
        snapshot: PlayerSnapshot,
        text_channel_id: ChannelId,
    ) -> PlayerResult<Self> {
        if snapshot.volume > MAX_VOLUME {
            return Err(PlayerError::InvalidState(format!(
                "volume {} exceeds {}",
                snapshot.volume, MAX_VOLUME
            )));
        }

        let mut player = Self::new(
            snapshot.guild_id,
            bot_id,
            snapshot.voice_channel_id,
            text_channel_id,
            snapshot.creator,
        );

        let mut playlists = PlaylistCache::default();
        player.queue = playlists.restore(snapshot.queue);
        player.history = playlists.restore(snapshot.history);
        player.autoplay_queue = playlists.restore(snapshot.autoplay_queue);
        player.failed_tracks = playlists.restore(snapshot.failed_tracks);

        player.volume = snapshot.volume;
        player.nightcore = snapshot.nightcore;
        player.paused = snapshot.paused;
        player.position = snapshot.position;
        player.message_id = snapshot.message_id;
        player.static_mode = snapshot.static_mode;
        player.dj = snapshot.dj;
        player.loop_mode = snapshot.loop_mode;
        player.autoplay = snapshot.autoplay;
        player.keep_connected = snapshot.keep_connected;
        player.purge_mode = snapshot.purge_mode;
        player.skin = snapshot.skin;
        player.static_skin = snapshot.static_skin;
        player.custom_skin = snapshot.custom_skin;
        player.custom_static_skin = snapshot.custom_static_skin;
        player.prefix_info = snapshot.prefix_info;
        player.voice_state = snapshot.voice_state;

        if player.keep_connected && player.queue.is_empty() {
            player.refill_for_keep_connected();
        }
        Ok(player)
    }

    fn refill_for_keep_connected(&mut self) {
        if !self.failed_tracks.is_empty() {
            self.queue = self.failed_tracks.drain(..).rev().collect();
        } else {
            self.queue = std::mem::take(&mut self.history);
        }
    }

    /// Position in the current track, counting time played since the last
    /// start or resume.
    pub fn position(&self) -> u64 {
        let elapsed = match (self.paused, self.playing_since) {
            (false, Some(since)) => since.elapsed().as_millis() as u64,
            _ => 0,
        };
        let position = self.position + elapsed;
        match &self.current {
            Some(track) if track.is_stream => 0,
            Some(track) => position.min(track.duration_ms),
            // restored but not started yet; belongs to the queue head
            None => position,
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        if paused == self.paused {
            return;
        }
        self.position = self.position();
        self.paused = paused;
        self.playing_since = (!paused).then(Instant::now);
    }

    pub fn seek(&mut self, position: u64) {
        self.position = position;
        self.playing_since = (!self.paused && self.current.is_some()).then(Instant::now);
        self.position = self.position();
    }

    /// Marks `current` as started at `position`.
    pub fn begin_current(&mut self, position: u64, paused: bool) {
        self.paused = paused;
        self.position = 0;
        self.playing_since = None;
        self.seek(position);
    }

    /// Takes the next track to play and makes it current. The track that
    /// was playing is retired according to the loop mode.
    pub fn advance(&mut self) -> Option<&Track> {
        if let Some(finished) = self.current.take() {
            match self.loop_mode {
                LoopMode::Track => self.queue.push_front(finished),
                LoopMode::Queue => self.queue.push_back(finished),
                LoopMode::Off => self.remember(finished),
            }
        }
        self.take_head()
    }

    /// Makes the queue head current without touching history.
    pub fn take_head(&mut self) -> Option<&Track> {
        let next = match self.queue.pop_front() {
            Some(track) => Some(track),
            None if self.autoplay => self.autoplay_queue.pop_front(),
            None => None,
        };
        self.current = next;
        self.position = 0;
        self.playing_since = None;
        self.current.as_ref()
    }

    /// Moves the current track to the failed list.
    pub fn fail_current(&mut self) {
        if let Some(track) = self.current.take() {
            self.failed_tracks.push_back(track);
        }
        self.position = 0;
        self.playing_since = None;
    }

    fn remember(&mut self, track: Track) {
        self.history.push_front(track);
        self.history.truncate(self.max_history);
    }

    pub fn now_playing(&self) -> NowPlaying {
        NowPlaying {
            guild_id: self.guild_id,
            bot_id: self.bot_id,
            track: self.current.clone(),
            position: self.position(),
            paused: self.paused,
            volume: self.volume,
            loop_mode: self.loop_mode,
            queue_len: self.queue.len(),
            voice_channel_id: self.voice_channel_id,
        }
    }

    /// Snapshot with the current track at the head of the queue.
    pub fn to_snapshot(&self) -> PlayerSnapshot {
        let records = |tracks: &VecDeque<Track>| tracks.iter().map(Track::to_record).collect::<Vec<_>>();

        let mut queue = Vec::with_capacity(self.queue.len() + 1);
        if let Some(current) = &self.current {
            queue.push(current.to_record());
        }
        queue.extend(self.queue.iter().map(Track::to_record));

        PlayerSnapshot {
            version: SNAPSHOT_VERSION,
            guild_id: self.guild_id,
            volume: self.volume,
            nightcore: self.nightcore,
            position: self.position(),
            paused: self.paused,
            voice_channel_id: self.voice_channel_id,
            text_channel_id: Some(self.text_channel_id),
            message_id: self.message_id,
            static_mode: self.static_mode,
            dj: self.dj.clone(),
            creator: self.creator,
            loop_mode: self.loop_mode,
            autoplay: self.autoplay,
            keep_connected: self.keep_connected,
            purge_mode: self.purge_mode,
            skin: self.skin.clone(),
            static_skin: self.static_skin.clone(),
            custom_skin: self.custom_skin.clone(),
            custom_static_skin: self.custom_static_skin.clone(),
            queue,
            history: records(&self.history),
            autoplay_queue: records(&self.autoplay_queue),
            failed_tracks: records(&self.failed_tracks),
            prefix_info: self.prefix_info.clone(),
            voice_state: self.voice_state.clone(),
            saved_at: now_ms(),
        }
    }
}
