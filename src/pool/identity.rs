use std::sync::Arc;

use tracing::info;

use super::PoolEvent;
use crate::{
    common::types::BotId,
    configs::Config,
    platform::Platform,
    player::PlayerRegistry,
    resume::{ResumeOrchestrator, ResumeReport},
    store::SessionStore,
};

/// One bot account: its platform handle, its snapshot namespace and its
/// live players.
pub struct BotIdentity {
    bot_id: BotId,
    registry: Arc<PlayerRegistry>,
    resume: ResumeOrchestrator,
}

impl BotIdentity {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<SessionStore>,
        config: &Config,
        events: flume::Sender<PoolEvent>,
    ) -> Self {
        let bot_id = platform.bot_id();
        let registry = Arc::new(PlayerRegistry::new(
            platform,
            store,
            events,
            config.player.clone(),
        ));
        Self {
            bot_id,
            resume: ResumeOrchestrator::new(registry.clone(), config.storage.grace_window_ms()),
            registry,
        }
    }

    /// Opens the snapshot store for this bot per configuration.
    pub async fn connect(
        platform: Arc<dyn Platform>,
        config: &Config,
        events: flume::Sender<PoolEvent>,
    ) -> Self {
        let store = SessionStore::open(&config.storage, platform.bot_id()).await;
        Self::new(platform, Arc::new(store), config, events)
    }

    pub fn bot_id(&self) -> BotId {
        self.bot_id
    }

    pub fn players(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Call once the platform connection reports ready. Resuming happens at
    /// most once per process.
    pub async fn on_ready(&self) -> Option<ResumeReport> {
        info!("Bot {} is ready", self.bot_id);
        self.resume.run().await
    }

    /// Final save of every live player before the process exits.
    pub async fn shutdown(&self) {
        self.registry.save_all().await;
        for guild_id in self.registry.guilds() {
            if let Some(player) = self.registry.get(guild_id) {
                player.lock().await.tasks.cancel_all();
            }
        }
    }
}
