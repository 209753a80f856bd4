//! Rebuilds live players from stored snapshots once the platform is ready.

pub mod surface;
pub mod voice;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::{error, info, warn};

use crate::{
    common::{
        errors::PlayerError,
        types::{GuildId, now_ms},
    },
    player::{Player, PlayerRegistry, playback},
    pool::PoolEvent,
    snapshot::PlayerSnapshot,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The player is live again.
    Resumed { paused: bool },
    /// A live player already existed; its snapshot is left alone.
    Skipped,
    /// The snapshot was older than the grace window and is gone.
    Discarded(String),
    /// The snapshot stays for the next startup.
    Deferred(String),
}

#[derive(Debug, Default, Clone)]
pub struct ResumeReport {
    pub outcomes: Vec<(GuildId, ResumeOutcome)>,
}

impl ResumeReport {
    pub fn resumed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ResumeOutcome::Resumed { .. }))
            .count()
    }

    pub fn outcome(&self, guild_id: GuildId) -> Option<&ResumeOutcome> {
        self.outcomes
            .iter()
            .find(|(g, _)| *g == guild_id)
            .map(|(_, o)| o)
    }
}

/// Grace rule: a snapshot that cannot be restored is dropped only once it is
/// older than the window.
pub fn is_expired(saved_at: u64, now_ms: u64, grace_window_ms: u64) -> bool {
    now_ms.saturating_sub(saved_at) > grace_window_ms
}

pub struct ResumeOrchestrator {
    registry: Arc<PlayerRegistry>,
    grace_window_ms: u64,
    started: AtomicBool,
}

impl ResumeOrchestrator {
    pub fn new(registry: Arc<PlayerRegistry>, grace_window_ms: u64) -> Self {
        Self {
            registry,
            grace_window_ms,
            started: AtomicBool::new(false),
        }
    }

    /// Resumes every stored session, one guild at a time. Only the first call
    /// in a process does anything; later calls return `None`.
    pub async fn run(&self) -> Option<ResumeReport> {
        let bot_id = self.registry.bot_id();
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Bot {} already attempted to resume its players", bot_id);
            return None;
        }

        let mut report = ResumeReport::default();
        let snapshots = match self.registry.store().list_all().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                error!("Bot {} could not list stored players: {}", bot_id, e);
                return Some(report);
            }
        };
        info!("Bot {} found {} stored player sessions", bot_id, snapshots.len());

        for snapshot in snapshots {
            let guild_id = snapshot.guild_id;
            let outcome = self.resume_guild(snapshot).await;
            match &outcome {
                ResumeOutcome::Resumed { paused } => {
                    info!("[{}] Player resumed (paused: {})", guild_id, paused)
                }
                ResumeOutcome::Skipped => info!("[{}] Live player present, resume skipped", guild_id),
                ResumeOutcome::Discarded(reason) => {
                    warn!("[{}] Stored player discarded: {}", guild_id, reason)
                }
                ResumeOutcome::Deferred(reason) => {
                    warn!("[{}] Stored player kept for later: {}", guild_id, reason)
                }
            }
            self.registry.emit(PoolEvent::ResumeComplete {
                bot_id,
                guild_id,
                outcome: outcome.clone(),
            });
            report.outcomes.push((guild_id, outcome));
        }

        info!(
            "Bot {} resumed {} of {} players",
            bot_id,
            report.resumed(),
            report.outcomes.len()
        );
        Some(report)
    }

    async fn retire(&self, guild_id: GuildId, saved_at: u64, reason: String) -> ResumeOutcome {
        if !is_expired(saved_at, now_ms(), self.grace_window_ms) {
            return ResumeOutcome::Deferred(reason);
        }
        if let Err(e) = self.registry.store().delete(guild_id).await {
            error!("[{}] Failed to delete expired snapshot: {}", guild_id, e);
        }
        ResumeOutcome::Discarded(reason)
    }

    /// Restores one guild. Nothing here propagates; every failure turns into
    /// an outcome.
    pub async fn resume_guild(&self, snapshot: PlayerSnapshot) -> ResumeOutcome {
        let registry = &self.registry;
        let platform = registry.platform();
        let config = registry.config();
        let guild_id = snapshot.guild_id;
        let saved_at = snapshot.saved_at;
        let voice_channel_id = snapshot.voice_channel_id;

        if registry.contains(guild_id) {
            return ResumeOutcome::Skipped;
        }

        if let Err(e) = platform.guild(guild_id).await {
            return self.retire(guild_id, saved_at, format!("guild unavailable: {e}")).await;
        }

        let surface = surface::resolve(platform, &snapshot, config.history_lookback).await;

        if let Err(e) = platform.channel(guild_id, voice_channel_id).await {
            // a surface that fell back already points at the missing channel
            if !surface.fell_back {
                platform
                    .send_notice(
                        surface.channel_id,
                        "The player was terminated because its voice channel no longer exists.",
                    )
                    .await;
            }
            return self.retire(guild_id, saved_at, format!("voice channel missing: {e}")).await;
        }

        match platform.permissions(guild_id, voice_channel_id).await {
            Ok(perms) if perms.can_join() => {}
            Ok(_) => {
                platform
                    .send_notice(
                        surface.channel_id,
                        "The player was terminated because I may no longer join its voice channel.",
                    )
                    .await;
                return self
                    .retire(guild_id, saved_at, "no permission to join voice".into())
                    .await;
            }
            Err(e) => {
                return self
                    .retire(guild_id, saved_at, format!("voice permissions unavailable: {e}"))
                    .await;
            }
        }

        let position = snapshot.position;
        let paused = snapshot.paused;
        let mut player = match Player::from_snapshot(registry.bot_id(), snapshot, surface.channel_id) {
            Ok(player) => player,
            Err(e) => {
                error!("[{}] Stored player is unusable: {}", guild_id, e);
                return self.retire(guild_id, saved_at, e.to_string()).await;
            }
        };
        player.message_id = surface.message_id;
        player.static_mode = surface.static_mode;

        match platform.guild_settings(guild_id).await {
            Ok(settings) => {
                if player.prefix_info.is_none() {
                    player.prefix_info = settings.prefix;
                }
                if let Some(purge_mode) = settings.purge_mode {
                    player.purge_mode = purge_mode;
                }
                if player.custom_skin.is_none() {
                    player.custom_skin = settings.custom_skins.get(&player.skin).cloned();
                }
                if player.custom_static_skin.is_none() {
                    player.custom_static_skin =
                        settings.custom_static_skins.get(&player.static_skin).cloned();
                }
            }
            Err(e) => warn!("[{}] Guild settings unavailable: {}", guild_id, e),
        }

        let shared = match registry.insert(player) {
            Ok(shared) => shared,
            Err(PlayerError::AlreadyExists(_)) => return ResumeOutcome::Skipped,
            Err(e) => return self.retire(guild_id, saved_at, e.to_string()).await,
        };

        if let Err(e) = voice::join_and_confirm(platform, guild_id, voice_channel_id, config).await {
            registry.discard(guild_id).await;
            if let Err(e) = platform.disconnect_voice(guild_id).await {
                warn!("[{}] Voice cleanup failed: {}", guild_id, e);
            }
            return self.retire(guild_id, saved_at, e.to_string()).await;
        }

        let listeners_present = registry.listeners_present(guild_id, voice_channel_id).await;
        let resume_paused = paused && listeners_present;
        {
            let mut guard = shared.lock().await;
            let started = playback::start_head(&mut guard, platform, position, resume_paused).await;
            if !started {
                info!("[{}] Resumed with nothing to play", guild_id);
            }
            registry.spawn_background(&mut guard, listeners_present);
        }
        registry.push_now_playing(guild_id).await;

        ResumeOutcome::Resumed {
            paused: resume_paused,
        }
    }
}
