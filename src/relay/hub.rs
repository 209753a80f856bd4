use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{
    protocol::{self, ClientMessage, DISCONNECT_CLOSE_CODE, EVICTED_REASON},
    session::{HubFrame, RelaySession, Role},
};
use crate::{
    common::{
        errors::RelayError,
        types::{BotId, SessionId, UserId},
    },
    configs::RelayConfig,
};

#[derive(Default)]
struct Registry {
    /// At most one live viewer session per user id.
    viewers: HashMap<UserId, Arc<RelaySession>>,
    bots: HashMap<SessionId, Arc<RelaySession>>,
}

/// Routes rich-presence updates from bot processes to viewer clients.
pub struct Hub {
    min_client_version: String,
    registry: Mutex<Registry>,
}

impl Hub {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            min_client_version: config.min_client_version.clone(),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Opens a session for a fresh socket.
    pub fn connect(&self) -> (Arc<RelaySession>, flume::Receiver<HubFrame>) {
        let (tx, rx) = flume::unbounded();
        let session = Arc::new(RelaySession::new(tx));
        debug!("Relay session {} opened", session.id);
        (session, rx)
    }

    pub fn viewer_count(&self) -> usize {
        let registry = self.registry.lock();
        registry
            .viewers
            .values()
            .map(|s| &s.id)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn bot_count(&self) -> usize {
        self.registry.lock().bots.len()
    }

    pub fn viewer(&self, user_id: UserId) -> Option<Arc<RelaySession>> {
        self.registry.lock().viewers.get(&user_id).cloned()
    }

    pub fn handle_text(&self, session: &Arc<RelaySession>, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) if session.role() == Role::Pending => {
                self.reject(session, &e);
                return;
            }
            Err(e) => {
                warn!("Relay session {} sent a bad frame: {}", session.id, e);
                return;
            }
        };

        match (session.role(), message) {
            (Role::Pending, ClientMessage::BotHandshake { bot_ids, auth_enabled }) => {
                self.register_bot(session, bot_ids, auth_enabled)
            }
            (
                Role::Pending,
                ClientMessage::ViewerHandshake {
                    user_ids,
                    version,
                    token,
                    auth_enabled,
                },
            ) => {
                if let Err(e) =
                    protocol::validate_viewer(&user_ids, &version, &token, &self.min_client_version)
                {
                    self.reject(session, &e);
                    return;
                }
                self.register_viewer(session, user_ids, token, auth_enabled);
            }
            (Role::Pending, _) => {
                self.reject(session, &RelayError::Malformed("expected a handshake".into()))
            }
            (Role::Bot, ClientMessage::Update { user, token, message }) => {
                self.forward_update(session, user, token, message)
            }
            (Role::Viewer, ClientMessage::Close) => {
                self.disconnect(session);
                session.close(1000, "closed by client");
            }
            (_, ClientMessage::BotHandshake { .. } | ClientMessage::ViewerHandshake { .. }) => {
                warn!("Relay session {} repeated its handshake", session.id)
            }
            (role, _) => debug!("Relay session {} ({:?}) sent an unroutable frame", session.id, role),
        }
    }

    fn reject(&self, session: &RelaySession, error: &RelayError) {
        info!("Relay session {} rejected: {}", session.id, error);
        let reason = error.to_string();
        session.send_json(&protocol::disconnect(&reason));
        session.close(DISCONNECT_CLOSE_CODE, &reason);
    }

    fn register_bot(&self, session: &Arc<RelaySession>, bot_ids: Vec<BotId>, auth_enabled: bool) {
        session.become_bot(bot_ids.clone(), auth_enabled);
        self.registry
            .lock()
            .bots
            .insert(session.id.clone(), session.clone());
        info!(
            "Bot connection {} registered for {:?} (auth: {})",
            session.id, bot_ids, auth_enabled
        );
    }

    fn register_viewer(
        &self,
        session: &Arc<RelaySession>,
        user_ids: Vec<UserId>,
        token: String,
        auth_enabled: bool,
    ) {
        session.become_viewer(user_ids.clone(), token, auth_enabled);

        let bots: Vec<Arc<RelaySession>> = {
            let mut registry = self.registry.lock();

            let mut evicted: Vec<Arc<RelaySession>> = Vec::new();
            for user_id in &user_ids {
                if let Some(previous) = registry.viewers.get(user_id) {
                    if !evicted.iter().any(|e| e.id == previous.id) {
                        evicted.push(previous.clone());
                    }
                }
            }
            for previous in &evicted {
                registry.viewers.retain(|_, s| s.id != previous.id);
                previous.send_json(&protocol::disconnect(EVICTED_REASON));
                previous.close(DISCONNECT_CLOSE_CODE, EVICTED_REASON);
                info!("Viewer session {} replaced by {}", previous.id, session.id);
            }

            for user_id in &user_ids {
                registry.viewers.insert(*user_id, session.clone());
            }
            registry.bots.values().cloned().collect()
        };

        info!("Viewer session {} registered for {:?}", session.id, user_ids);
        for bot in bots {
            for user_id in &user_ids {
                bot.send_json(&protocol::request_update(*user_id));
            }
        }
    }

    fn forward_update(
        &self,
        bot: &RelaySession,
        user: UserId,
        token: Option<String>,
        mut message: Map<String, Value>,
    ) {
        let Some(viewer) = self.viewer(user) else {
            debug!("No viewer for user {}, update dropped", user);
            return;
        };

        let sender_bots = match message.get("bot_id").and_then(protocol::parse_id) {
            Some(bot_id) => vec![bot_id],
            None => bot.user_ids(),
        };

        if bot.auth_enabled() || viewer.auth_enabled() {
            let matches = token.as_deref().unwrap_or_default() == viewer.token();
            if !matches {
                if viewer.is_blocked() {
                    debug!("Viewer session {} blocked, update for {} suppressed", viewer.id, user);
                    return;
                }
                warn!("Token mismatch for user {}, blocking viewer session {}", user, viewer.id);
                viewer.set_blocked(true);
                viewer.send_json(&protocol::token_exception(message));
                return;
            }
            viewer.set_blocked(false);
        }

        message.remove("token");
        viewer.bind_bots(sender_bots);
        viewer.send_json(&Value::Object(message));
    }

    /// Drops a session from the registry. Viewers bound to a departing bot
    /// connection are told to clear that bot's presence.
    pub fn disconnect(&self, session: &Arc<RelaySession>) {
        let viewers: Vec<Arc<RelaySession>> = {
            let mut registry = self.registry.lock();
            match session.role() {
                Role::Viewer => {
                    registry.viewers.retain(|_, s| s.id != session.id);
                    Vec::new()
                }
                Role::Bot => {
                    registry.bots.remove(&session.id);
                    registry.viewers.values().cloned().collect()
                }
                Role::Pending => Vec::new(),
            }
        };

        if session.role() == Role::Bot {
            let bot_ids = session.user_ids();
            let mut notified: Vec<SessionId> = Vec::new();
            for viewer in viewers {
                if notified.contains(&viewer.id) {
                    continue;
                }
                notified.push(viewer.id.clone());
                let bound = viewer.unbind_bots(&bot_ids);
                if bound.is_empty() || viewer.is_blocked() {
                    continue;
                }
                viewer.send_json(&protocol::close_bots(&bound));
            }
            info!("Bot connection {} for {:?} left", session.id, bot_ids);
        } else {
            debug!("Relay session {} left", session.id);
        }
    }
}
