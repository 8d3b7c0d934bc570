//! WebSocket transport for subscriber sessions.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;

use super::handlers::AppState;
use crate::line::Line;
use crate::registry::SendError;
use crate::session::{Connection, Inbound, SubscriberSession};

/// A subscriber connected over WebSocket. Lines go out as text frames.
pub struct WsConnection {
    socket: WebSocket,
}

impl WsConnection {
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, line: &Line) -> Result<(), SendError> {
        self.socket
            .send(Message::Text(line.to_string()))
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }

    async fn receive(&mut self) -> Inbound {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Inbound::Data(text),
                Some(Ok(Message::Binary(data))) => {
                    return Inbound::Data(String::from_utf8_lossy(&data).into_owned());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Inbound::Disconnected,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    return Inbound::Disconnected;
                }
            }
        }
    }
}

/// GET /ws - Subscribe to the line stream.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = SubscriberSession::new(state.cache.clone(), state.registry.clone())
        .with_config(state.session.clone())
        .with_cancel(state.cancel.child_token());

    if let Err(e) = session.run(WsConnection::new(socket)).await {
        tracing::warn!(error = %e, "Subscriber session aborted");
    }
}
