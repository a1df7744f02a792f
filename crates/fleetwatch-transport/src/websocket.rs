//! WebSocket transport for live host sessions.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use fleetwatch_core::{EventSink, HostStore, RemoteShell, SessionEvent};
use fleetwatch_session::SessionController;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    AppState,
    protocol::{ClientMessage, ServerMessage},
};

/// Event sink feeding a socket's outbound queue.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ChannelSink {
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event.into()).is_ok()
    }
}

/// WebSocket upgrade handler for `/ws/core/{host_id}/`.
pub async fn ws_handler<S, R>(
    ws: WebSocketUpgrade,
    Path(host_id): Path<String>,
    State(state): State<AppState<S, R>>,
) -> impl IntoResponse
where
    S: HostStore + 'static,
    R: RemoteShell + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, host_id, state.controller))
}

async fn handle_socket<S, R>(socket: WebSocket, host_id: String, controller: SessionController<S, R>)
where
    S: HostStore + 'static,
    R: RemoteShell + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Forward queued messages; close the socket once every producer is gone
    let send_task = tokio::spawn(async move {
        let mut outbound = UnboundedReceiverStream::new(rx);
        while let Some(msg) = outbound.next().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let session = match controller.open(&host_id, Arc::new(ChannelSink::new(tx))).await {
        Ok(session) => session,
        Err(e) => {
            tracing::info!(%host_id, "closing socket: {e}");
            // The error frame is queued; the sender drains it, then closes.
            let _ = send_task.await;
            return;
        }
    };

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(session_id = %session.id(), "WebSocket error: {e}");
                break;
            }
        };

        match ClientMessage::parse(text.as_str()) {
            Some(action) => {
                tracing::info!(session_id = %session.id(), %action, "action requested");
                session.submit(action);
            }
            None => tracing::debug!(session_id = %session.id(), "ignoring unrecognised frame"),
        }
    }

    let session_id = session.id();
    session.close().await;
    send_task.abort();

    tracing::info!("WebSocket for session {session_id} disconnected");
}
