use std::{sync::Weak, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::trace;

use super::registry::{PlayerRegistry, save_player};
use crate::{common::types::GuildId, pool::PoolEvent};

/// Saves the player every `period`. A slow write delays the next one
/// instead of overlapping it.
pub fn spawn(registry: Weak<PlayerRegistry>, guild_id: GuildId, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(registry) = registry.upgrade() else {
                break;
            };
            let Some(player) = registry.get(guild_id) else {
                break;
            };

            // store errors are logged by the store
            if save_player(registry.store(), &player).await.is_ok() {
                trace!("[{}] Periodic snapshot written", guild_id);
            }
            registry.emit(PoolEvent::PeriodicTick {
                bot_id: registry.bot_id(),
                guild_id,
            });
        }
    })
}
