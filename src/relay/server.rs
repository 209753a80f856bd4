use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use tracing::{info, warn};

use super::{hub::Hub, session::HubFrame};

pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(hub)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn websocket_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

pub async fn handle_socket(mut socket: WebSocket, hub: Arc<Hub>) {
    let (session, rx) = hub.connect();
    let session_id = session.id.clone();
    info!("Relay socket connected: session={}", session_id);

    loop {
        tokio::select! {
            Ok(frame) = rx.recv_async() => {
                let (msg, last) = match frame {
                    HubFrame::Text(text) => (Message::Text(text.into()), false),
                    HubFrame::Close { code, reason } => (
                        Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })),
                        true,
                    ),
                };
                if let Err(e) = socket.send(msg).await {
                    warn!("Relay socket send error: session={} err={}", session_id, e);
                    break;
                }
                if last {
                    break;
                }
            }
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("Relay socket error: session={} err={}", session_id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => hub.handle_text(&session, text.as_str()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    hub.disconnect(&session);
    info!("Relay socket closed: session={}", session_id);
}
