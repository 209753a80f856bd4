pub mod events;
pub mod identity;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use events::{PoolEvent, RpcListener, RpcPayload};
pub use identity::BotIdentity;

use crate::{
    common::types::{BotId, UserId},
    configs::{Config, RpcClientConfig},
    platform::Platform,
    relay::{RpcClient, RpcHandle, UpdateRequestHandler},
};

struct RpcLink {
    handle: RpcHandle,
    cancel_token: CancellationToken,
}

/// Every bot identity this process drives, sharing one event stream.
pub struct Pool {
    identities: DashMap<BotId, Arc<BotIdentity>>,
    events_tx: flume::Sender<PoolEvent>,
    events_rx: flume::Receiver<PoolEvent>,
    rpc: Mutex<Option<RpcLink>>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            identities: DashMap::new(),
            events_tx,
            events_rx,
            rpc: Mutex::new(None),
        }
    }

    pub fn events(&self) -> flume::Receiver<PoolEvent> {
        self.events_rx.clone()
    }

    pub fn event_sender(&self) -> flume::Sender<PoolEvent> {
        self.events_tx.clone()
    }

    /// Adds a bot; a second registration of the same id replaces nothing and
    /// returns the existing identity.
    pub async fn add_bot(&self, platform: Arc<dyn Platform>, config: &Config) -> Arc<BotIdentity> {
        let bot_id = platform.bot_id();
        if let Some(existing) = self.get(bot_id) {
            return existing;
        }
        let identity = Arc::new(BotIdentity::connect(platform, config, self.event_sender()).await);
        let identity = self.identities.entry(bot_id).or_insert(identity).value().clone();
        self.attach_rpc(&identity);
        info!("Bot {} joined the pool ({} total)", bot_id, self.identities.len());
        identity
    }

    pub fn insert(&self, identity: BotIdentity) -> Arc<BotIdentity> {
        let identity = Arc::new(identity);
        self.identities.insert(identity.bot_id(), identity.clone());
        self.attach_rpc(&identity);
        identity
    }

    fn attach_rpc(&self, identity: &BotIdentity) {
        if let Some(link) = self.rpc.lock().as_ref() {
            identity.players().attach_rpc(link.handle.clone());
        }
    }

    /// Connects the pool to the relay hub when `[rpc]` is enabled. Spawns the
    /// client's reconnect loop; every identity then publishes its presence
    /// updates through it. Returns the token that stops the client, or `None`
    /// when disabled or already running.
    pub fn start_rpc(self: &Arc<Self>, config: &RpcClientConfig) -> Option<CancellationToken> {
        if !config.enabled {
            debug!("Relay client disabled");
            return None;
        }

        let mut rpc = self.rpc.lock();
        if rpc.is_some() {
            return None;
        }

        let bot_ids = self.bots();
        let (client, handle) = RpcClient::new(config, bot_ids.clone(), self.presence_handler());
        let cancel_token = client.cancel_token();
        for entry in self.identities.iter() {
            entry.value().players().attach_rpc(handle.clone());
        }
        *rpc = Some(RpcLink {
            handle,
            cancel_token: cancel_token.clone(),
        });
        drop(rpc);

        tokio::spawn(client.run());
        info!("Relay client started for {:?} ({})", bot_ids, config.url);
        Some(cancel_token)
    }

    pub fn get(&self, bot_id: BotId) -> Option<Arc<BotIdentity>> {
        self.identities.get(&bot_id).map(|entry| entry.value().clone())
    }

    pub fn bots(&self) -> Vec<BotId> {
        self.identities.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Re-sends presence for `user_id` from every bot. Returns how many
    /// guilds were refreshed.
    pub async fn refresh_presence(&self, user_id: UserId) -> usize {
        let identities: Vec<_> = self.identities.iter().map(|e| e.value().clone()).collect();
        let mut refreshed = 0;
        for identity in identities {
            refreshed += identity.players().refresh_presence(user_id).await;
        }
        refreshed
    }

    /// Answers relay update requests without holding the pool alive.
    pub fn presence_handler(self: &Arc<Self>) -> UpdateRequestHandler {
        let pool = Arc::downgrade(self);
        Arc::new(move |user_id| {
            let Some(pool) = pool.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                let refreshed = pool.refresh_presence(user_id).await;
                debug!("Refreshed presence of {} in {} guilds", user_id, refreshed);
            });
        })
    }

    pub async fn shutdown(&self) {
        if let Some(link) = self.rpc.lock().take() {
            link.cancel_token.cancel();
        }
        let identities: Vec<_> = self.identities.iter().map(|e| e.value().clone()).collect();
        for identity in identities {
            identity.shutdown().await;
        }
    }
}
