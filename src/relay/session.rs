use std::collections::BTreeSet;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::common::types::{BotId, SessionId, UserId};

/// What the socket task should write next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubFrame {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connected, no handshake yet.
    Pending,
    Viewer,
    Bot,
}

#[derive(Debug)]
struct SessionState {
    role: Role,
    user_ids: Vec<UserId>,
    token: String,
    auth_enabled: bool,
    /// Updates with a mismatched token are suppressed while set.
    blocked: bool,
    /// Bots that have pushed updates to this viewer.
    bound_bots: BTreeSet<BotId>,
    closed: bool,
}

/// One relay socket. Outgoing frames go through a channel drained by the
/// socket task.
pub struct RelaySession {
    pub id: SessionId,
    outbox: flume::Sender<HubFrame>,
    state: Mutex<SessionState>,
}

impl RelaySession {
    pub fn new(outbox: flume::Sender<HubFrame>) -> Self {
        Self {
            id: SessionId::generate(),
            outbox,
            state: Mutex::new(SessionState {
                role: Role::Pending,
                user_ids: Vec::new(),
                token: String::new(),
                auth_enabled: false,
                blocked: false,
                bound_bots: BTreeSet::new(),
                closed: false,
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.state.lock().role
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.state.lock().user_ids.clone()
    }

    pub fn token(&self) -> String {
        self.state.lock().token.clone()
    }

    pub fn auth_enabled(&self) -> bool {
        self.state.lock().auth_enabled
    }

    pub fn is_blocked(&self) -> bool {
        self.state.lock().blocked
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.state.lock().blocked = blocked;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn become_viewer(&self, user_ids: Vec<UserId>, token: String, auth_enabled: bool) {
        let mut state = self.state.lock();
        state.role = Role::Viewer;
        state.user_ids = user_ids;
        state.token = token;
        state.auth_enabled = auth_enabled;
    }

    pub(crate) fn become_bot(&self, bot_ids: Vec<BotId>, auth_enabled: bool) {
        let mut state = self.state.lock();
        state.role = Role::Bot;
        state.user_ids = bot_ids;
        state.auth_enabled = auth_enabled;
    }

    pub(crate) fn bind_bots(&self, bots: impl IntoIterator<Item = BotId>) {
        self.state.lock().bound_bots.extend(bots);
    }

    /// Forgets the given bots, returning those that were bound.
    pub(crate) fn unbind_bots(&self, bots: &[BotId]) -> Vec<BotId> {
        let mut state = self.state.lock();
        bots.iter()
            .copied()
            .filter(|bot| state.bound_bots.remove(bot))
            .collect()
    }

    pub fn send_json(&self, value: &Value) {
        if self.is_closed() {
            trace!("Dropping frame for closed relay session {}", self.id);
            return;
        }
        let _ = self.outbox.send(HubFrame::Text(value.to_string()));
    }

    /// Queues a close frame. Only the first call has an effect.
    pub fn close(&self, code: u16, reason: &str) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        let _ = self.outbox.send(HubFrame::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nothing_is_sent_after_close() {
        let (tx, rx) = flume::unbounded();
        let session = RelaySession::new(tx);

        session.send_json(&json!({"op": "a"}));
        session.close(4000, "bye");
        session.close(4000, "bye again");
        session.send_json(&json!({"op": "b"}));

        let frames: Vec<_> = rx.drain().collect();
        assert_eq!(
            frames,
            vec![
                HubFrame::Text(r#"{"op":"a"}"#.into()),
                HubFrame::Close {
                    code: 4000,
                    reason: "bye".into()
                }
            ]
        );
    }

    #[test]
    fn unbind_reports_only_bound_bots() {
        let (tx, _rx) = flume::unbounded();
        let session = RelaySession::new(tx);
        session.bind_bots([UserId(1), UserId(2)]);
        assert_eq!(session.unbind_bots(&[UserId(2), UserId(3)]), vec![UserId(2)]);
        assert!(session.unbind_bots(&[UserId(2)]).is_empty());
    }
}
