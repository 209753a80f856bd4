use std::{sync::Weak, time::Duration};

use tokio::{task::JoinHandle, time::Instant};
use tracing::info;

use super::registry::PlayerRegistry;
use crate::common::types::GuildId;

/// Destroys the player once its voice channel has had no listeners for
/// longer than the idle timeout. `listeners_present` seeds the first check
/// so a player resumed into an empty channel starts counting right away.
pub fn spawn(registry: Weak<PlayerRegistry>, guild_id: GuildId, listeners_present: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (check_every, idle_timeout) = match registry.upgrade() {
            Some(registry) => (
                Duration::from_secs(registry.config().idle_check_interval_secs.max(1)),
                Duration::from_secs(registry.config().idle_timeout_secs),
            ),
            None => return,
        };
        let mut alone_since = (!listeners_present).then(Instant::now);

        loop {
            tokio::time::sleep(check_every).await;

            let Some(registry) = registry.upgrade() else {
                break;
            };
            let Some(player) = registry.get(guild_id) else {
                break;
            };
            let (keep_connected, voice_channel_id, text_channel_id) = {
                let guard = player.lock().await;
                (guard.keep_connected, guard.voice_channel_id, guard.text_channel_id)
            };

            if keep_connected || registry.listeners_present(guild_id, voice_channel_id).await {
                alone_since = None;
                continue;
            }

            let since = *alone_since.get_or_insert_with(Instant::now);
            if since.elapsed() < idle_timeout {
                continue;
            }

            info!("[{}] Nobody listening for {:?}, leaving", guild_id, idle_timeout);
            registry
                .platform()
                .send_notice(text_channel_id, "The player was stopped because the voice channel was empty.")
                .await;
            // destroy cancels this task, so it runs detached
            tokio::spawn(async move {
                registry.destroy(guild_id, "idle timeout").await;
            });
            break;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::types::{BotId, ChannelId, UserId},
        configs::{PlayerConfig, StorageConfig},
        platform::{MemberInfo, mock::MockPlatform},
        player::Player,
        pool::PoolEvent,
        store::SessionStore,
    };
    use std::sync::Arc;

    const BOT: BotId = UserId(2);
    const GUILD: GuildId = GuildId(3);

    async fn registry(dir: &tempfile::TempDir, platform: Arc<MockPlatform>) -> (Arc<PlayerRegistry>, flume::Receiver<PoolEvent>) {
        let storage = StorageConfig {
            sessions_dir: dir.path().to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };
        let store = Arc::new(SessionStore::open_with(&storage, BOT, None).await);
        let (tx, rx) = flume::unbounded();
        let config = PlayerConfig {
            idle_timeout_secs: 60,
            idle_check_interval_secs: 10,
            ..PlayerConfig::default()
        };
        (Arc::new(PlayerRegistry::new(platform, store, tx, config)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn empty_channel_destroys_the_player() {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(MockPlatform::new(BOT, GUILD));
        let (registry, events) = registry(&dir, platform.clone()).await;
        registry
            .insert(Player::new(GUILD, BOT, ChannelId(1), ChannelId(2), UserId(1)))
            .unwrap();

        let _watcher = spawn(Arc::downgrade(&registry), GUILD, false);

        let event = events.recv_async().await.unwrap();
        assert!(matches!(event, PoolEvent::PlayerDestroyed { guild_id: GUILD, .. }));
        assert!(!registry.contains(GUILD));
        assert_eq!(platform.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_connected_players_stay() {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(MockPlatform::new(BOT, GUILD));
        let (registry, _events) = registry(&dir, platform.clone()).await;
        let mut player = Player::new(GUILD, BOT, ChannelId(1), ChannelId(2), UserId(1));
        player.keep_connected = true;
        registry.insert(player).unwrap();

        let watcher = spawn(Arc::downgrade(&registry), GUILD, false);
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert!(registry.contains(GUILD));
        assert!(!watcher.is_finished());
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_reset_the_clock() {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(MockPlatform::new(BOT, GUILD));
        platform.set_members(ChannelId(1), vec![MemberInfo { id: UserId(9), bot: false }]);
        let (registry, _events) = registry(&dir, platform.clone()).await;
        registry
            .insert(Player::new(GUILD, BOT, ChannelId(1), ChannelId(2), UserId(1)))
            .unwrap();

        let watcher = spawn(Arc::downgrade(&registry), GUILD, true);
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert!(registry.contains(GUILD));
        watcher.abort();
    }
}
