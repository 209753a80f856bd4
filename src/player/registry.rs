use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{idle, playback, saver, state::Player};
use crate::{
    common::{
        errors::{PlayerError, PlayerResult},
        types::{BotId, ChannelId, GuildId, Shared, UserId},
    },
    configs::PlayerConfig,
    platform::{Platform, RequestContext},
    pool::{PoolEvent, RpcListener, RpcPayload},
    relay::RpcHandle,
    store::SessionStore,
};

pub type SharedPlayer = Shared<Player>;

/// Live players of one bot identity.
pub struct PlayerRegistry {
    bot_id: BotId,
    players: DashMap<GuildId, SharedPlayer>,
    platform: Arc<dyn Platform>,
    store: Arc<SessionStore>,
    events: flume::Sender<PoolEvent>,
    rpc: parking_lot::RwLock<Option<RpcHandle>>,
    config: PlayerConfig,
}

impl PlayerRegistry {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<SessionStore>,
        events: flume::Sender<PoolEvent>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            bot_id: platform.bot_id(),
            players: DashMap::new(),
            platform,
            store,
            events,
            rpc: parking_lot::RwLock::new(None),
            config,
        }
    }

    /// Presence updates are also published to the relay from now on.
    pub fn attach_rpc(&self, handle: RpcHandle) {
        *self.rpc.write() = Some(handle);
    }

    pub fn bot_id(&self) -> BotId {
        self.bot_id
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedPlayer> {
        self.players.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.players.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.players.iter().map(|entry| *entry.key()).collect()
    }

    /// Registers a player; a guild holds at most one.
    pub fn insert(&self, mut player: Player) -> PlayerResult<SharedPlayer> {
        let guild_id = player.guild_id;
        player.max_history = self.config.max_history;
        match self.players.entry(guild_id) {
            Entry::Occupied(_) => Err(PlayerError::AlreadyExists(guild_id)),
            Entry::Vacant(slot) => {
                let shared = Arc::new(Mutex::new(player));
                slot.insert(shared.clone());
                Ok(shared)
            }
        }
    }

    /// Removes a player without touching voice or the store.
    pub async fn discard(&self, guild_id: GuildId) {
        if let Some((_, player)) = self.players.remove(&guild_id) {
            player.lock().await.tasks.cancel_all();
        }
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        if let Some(rpc) = self.rpc.read().as_ref() {
            rpc.handle_event(&event);
        }
        if self.events.send(event).is_err() {
            debug!("Pool event dropped, no receiver");
        }
    }

    /// Writes the current snapshot of a live player.
    pub async fn save(&self, guild_id: GuildId) -> PlayerResult<()> {
        let Some(player) = self.get(guild_id) else {
            return Ok(());
        };
        save_player(&self.store, &player).await
    }

    /// Saves every live player; used on shutdown.
    pub async fn save_all(&self) {
        for guild_id in self.guilds() {
            let _ = self.save(guild_id).await;
        }
    }

    /// Tears a player down.
    ///
    /// The final snapshot is written before voice is released so a crash in
    /// between still leaves a resumable session. It is deleted only after a
    /// clean disconnect. An in-flight periodic save finishes before the
    /// writer is cancelled, and no other save runs until teardown is done.
    pub async fn destroy(&self, guild_id: GuildId, reason: &str) -> bool {
        let Some((_, player)) = self.players.remove(&guild_id) else {
            return false;
        };

        let save_guard = player.lock().await.save_guard.clone();
        let _saving = save_guard.lock().await;
        player.lock().await.tasks.cancel_all();
        let saved = write_snapshot(&self.store, &player).await.is_ok();

        match self.platform.disconnect_voice(guild_id).await {
            Ok(()) => {
                if let Err(e) = self.store.delete(guild_id).await {
                    warn!("[{}] Failed to delete player snapshot: {}", guild_id, e);
                }
            }
            Err(e) => warn!(
                "[{}] Voice disconnect failed, keeping snapshot (saved: {}): {}",
                guild_id, saved, e
            ),
        }

        info!("[{}] Player destroyed: {}", guild_id, reason);
        self.emit(PoolEvent::PlayerDestroyed {
            bot_id: self.bot_id,
            guild_id,
            reason: reason.to_string(),
        });
        true
    }

    /// Command-side stop: destroys the player and answers the request.
    pub async fn stop(&self, guild_id: GuildId, ctx: &mut RequestContext) -> PlayerResult<()> {
        ctx.deferred_ack(self.platform()).await?;
        if !self.destroy(guild_id, "stopped by command").await {
            ctx.reply(self.platform(), "There is no active player in this server.")
                .await?;
            return Err(PlayerError::InvalidState("no active player".into()));
        }
        ctx.edit(self.platform(), "The player was stopped.").await?;
        Ok(())
    }

    /// Called by the audio node when the current track ends.
    pub async fn track_finished(&self, guild_id: GuildId) {
        let Some(player) = self.get(guild_id) else {
            return;
        };

        let started = {
            let mut guard = player.lock().await;
            playback::play_next(&mut guard, self.platform()).await
        };

        if started {
            self.push_now_playing(guild_id).await;
            return;
        }

        debug!("[{}] Queue ran dry", guild_id);
        let _ = self.save(guild_id).await;
        self.emit(PoolEvent::TrackEndedWithEmptyQueue {
            bot_id: self.bot_id,
            guild_id,
        });
    }

    /// Whether anyone who is not a bot sits in the channel.
    pub async fn listeners_present(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        match self.platform.voice_members(guild_id, channel_id).await {
            Ok(members) => members.iter().any(|m| !m.bot),
            Err(e) => {
                debug!("[{}] Could not list voice members: {}", guild_id, e);
                false
            }
        }
    }

    /// Redraws the controller and pushes rich presence to listeners.
    pub async fn push_now_playing(&self, guild_id: GuildId) {
        let Some(player) = self.get(guild_id) else {
            return;
        };
        let (now_playing, text_channel_id, message_id) = {
            let guard = player.lock().await;
            (guard.now_playing(), guard.text_channel_id, guard.message_id)
        };

        match self
            .platform
            .render_controller(text_channel_id, message_id, &now_playing)
            .await
        {
            Ok(rendered) if rendered != message_id => player.lock().await.message_id = rendered,
            Ok(_) => {}
            Err(e) => debug!("[{}] Controller update failed: {}", guild_id, e),
        }

        let members = self
            .platform
            .voice_members(guild_id, now_playing.voice_channel_id)
            .await
            .unwrap_or_default();
        let mut listeners = Vec::new();
        for member in members.into_iter().filter(|m| !m.bot) {
            listeners.push(RpcListener {
                user_id: member.id,
                token: self.platform.rpc_token(member.id).await,
            });
        }

        self.emit(PoolEvent::RpcUpdate {
            bot_id: self.bot_id,
            guild_id,
            payload: RpcPayload {
                listeners,
                now_playing,
            },
        });
    }

    /// Re-sends presence for every guild where `user` is listening. Returns
    /// how many guilds were refreshed.
    pub async fn refresh_presence(&self, user_id: UserId) -> usize {
        let mut refreshed = 0;
        for guild_id in self.guilds() {
            let Some(player) = self.get(guild_id) else {
                continue;
            };
            let channel_id = player.lock().await.voice_channel_id;
            let listening = self
                .platform
                .voice_members(guild_id, channel_id)
                .await
                .map(|members| members.iter().any(|m| m.id == user_id))
                .unwrap_or(false);
            if listening {
                self.push_now_playing(guild_id).await;
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Starts the periodic saver and the idle watcher for a live player.
    pub fn spawn_background(self: &Arc<Self>, player: &mut Player, listeners_present: bool) {
        let guild_id = player.guild_id;
        player.tasks.push(
            "snapshot-writer",
            saver::spawn(Arc::downgrade(self), guild_id, self.store.save_interval()),
        );
        player.tasks.push(
            "idle-watcher",
            idle::spawn(Arc::downgrade(self), guild_id, listeners_present),
        );
    }
}

/// Saves are serialized per player so the newest state is written last.
pub(crate) async fn save_player(store: &SessionStore, player: &SharedPlayer) -> PlayerResult<()> {
    let save_guard = player.lock().await.save_guard.clone();
    let _saving = save_guard.lock().await;
    write_snapshot(store, player).await
}

/// Caller holds the player's `save_guard`.
async fn write_snapshot(store: &SessionStore, player: &SharedPlayer) -> PlayerResult<()> {
    let (guild_id, snapshot) = {
        let guard = player.lock().await;
        (guard.guild_id, guard.to_snapshot())
    };
    store.put(guild_id, &snapshot).await?;
    Ok(())
}
