use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    backoff::Backoff,
    protocol::{DISCONNECT_CLOSE_CODE, parse_id},
};
use crate::{
    common::types::{AnyResult, BotId, GuildId, UserId},
    configs::RpcClientConfig,
    pool::{PoolEvent, RpcPayload},
};

/// Called when the hub asks for a user's current state.
pub type UpdateRequestHandler = Arc<dyn Fn(UserId) + Send + Sync>;

enum SessionOutcome {
    Shutdown,
    Reconnect,
    /// The hub refused us; retrying would loop.
    Rejected,
}

/// Frames for every listener of one now-playing update.
pub fn update_frames(bot_id: BotId, guild_id: GuildId, payload: &RpcPayload) -> Vec<Value> {
    let now_playing = &payload.now_playing;
    let op = if now_playing.track.is_some() { "update" } else { "idle" };
    let info = json!({
        "position": now_playing.position,
        "paused": now_playing.paused,
        "volume": now_playing.volume,
        "loop_mode": now_playing.loop_mode,
        "queue_len": now_playing.queue_len,
        "voice_channel_id": now_playing.voice_channel_id,
    });

    payload
        .listeners
        .iter()
        .map(|listener| {
            json!({
                "op": op,
                "user": listener.user_id,
                "bot_id": bot_id,
                "guild_id": guild_id,
                "token": listener.token.clone().unwrap_or_default(),
                "track": now_playing.track,
                "info": info,
            })
        })
        .collect()
}

/// Queues presence updates for the relay connection.
#[derive(Clone)]
pub struct RpcHandle {
    outbox: flume::Sender<String>,
}

impl RpcHandle {
    pub fn publish(&self, bot_id: BotId, guild_id: GuildId, payload: &RpcPayload) -> usize {
        let frames = update_frames(bot_id, guild_id, payload);
        let count = frames.len();
        for frame in frames {
            if self.outbox.send(frame.to_string()).is_err() {
                return 0;
            }
        }
        count
    }

    /// Forwards `RpcUpdate` events; everything else is ignored.
    pub fn handle_event(&self, event: &PoolEvent) -> bool {
        match event {
            PoolEvent::RpcUpdate {
                bot_id,
                guild_id,
                payload,
            } => {
                self.publish(*bot_id, *guild_id, payload);
                true
            }
            _ => false,
        }
    }
}

/// Keeps one connection to the relay hub open on behalf of a set of bots.
pub struct RpcClient {
    url: String,
    bot_ids: Vec<BotId>,
    auth_enabled: bool,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
    outbox: flume::Receiver<String>,
    on_request: UpdateRequestHandler,
    cancel_token: CancellationToken,
}

impl RpcClient {
    pub fn new(
        config: &RpcClientConfig,
        bot_ids: Vec<BotId>,
        on_request: UpdateRequestHandler,
    ) -> (Self, RpcHandle) {
        let (tx, rx) = flume::unbounded();
        let client = Self {
            url: config.url.clone(),
            bot_ids,
            auth_enabled: config.auth_enabled,
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
            outbox: rx,
            on_request,
            cancel_token: CancellationToken::new(),
        };
        (client, RpcHandle { outbox: tx })
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn run(self) {
        let mut backoff = Backoff::new(self.backoff_base_ms, self.backoff_max_ms);

        loop {
            if self.cancel_token.is_cancelled() {
                return;
            }

            match self.session(&mut backoff).await {
                Ok(SessionOutcome::Shutdown) => {
                    debug!("Relay client for {:?} shutting down", self.bot_ids);
                    return;
                }
                Ok(SessionOutcome::Rejected) => {
                    warn!("Relay hub refused bots {:?}, giving up", self.bot_ids);
                    return;
                }
                Ok(SessionOutcome::Reconnect) => {}
                Err(e) => warn!("Relay connection error: {}", e),
            }

            let delay = backoff.next();
            debug!(
                "Reconnecting to relay hub in {:?} (attempt {})",
                delay,
                backoff.attempt()
            );
            tokio::select! {
                _ = self.cancel_token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn handshake(&self) -> Value {
        json!({
            "user_ids": self.bot_ids,
            "bot": true,
            "auth_enabled": self.auth_enabled,
        })
    }

    async fn session(&self, backoff: &mut Backoff) -> AnyResult<SessionOutcome> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(self.handshake().to_string().into()))
            .await?;
        backoff.reset();
        info!("Connected to relay hub {} for bots {:?}", self.url, self.bot_ids);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionOutcome::Shutdown);
                }
                frame = self.outbox.recv_async() => {
                    let Ok(frame) = frame else {
                        return Ok(SessionOutcome::Shutdown);
                    };
                    write.send(Message::Text(frame.into())).await?;
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionOutcome::Reconnect),
                    };
                    match msg {
                        Message::Text(text) => self.handle_text(text.as_str()),
                        Message::Close(frame) => {
                            let code: u16 = frame.as_ref().map(|f| f.code.into()).unwrap_or(1000);
                            info!("Relay hub closed the connection (code {})", code);
                            if code == DISCONNECT_CLOSE_CODE {
                                return Ok(SessionOutcome::Rejected);
                            }
                            return Ok(SessionOutcome::Reconnect);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            warn!("Relay hub sent a non-JSON frame");
            return;
        };
        match value.get("op").and_then(Value::as_str) {
            Some("rpc_update") => {
                if let Some(user) = value.get("user").and_then(parse_id) {
                    (self.on_request)(user);
                }
            }
            Some("disconnect") => {
                let reason = value.get("reason").and_then(Value::as_str).unwrap_or("no reason");
                warn!("Relay hub disconnects us: {}", reason);
            }
            op => debug!("Ignoring relay frame {:?}", op),
        }
    }
}
