//! WebSocket handling for the document/presence channel

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pairpad_protocol::{new_id, ClientId, DocClientMessage, DEFAULT_ROOM};

use crate::outbound::{spawn_writer, OutboundMessage, OUTBOUND_CAPACITY};
use crate::state::AppState;
use crate::{document, presence};

#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    #[serde(default)]
    pub room: Option<String>,
}

impl RoomQuery {
    /// Missing and empty both mean the default room.
    pub fn room_id(&self) -> &str {
        self.room
            .as_deref()
            .filter(|room| !room.is_empty())
            .unwrap_or(DEFAULT_ROOM)
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RoomQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let room_id = query.room_id().to_string();
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id))
}

/// Handle a document connection from join to close
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room_id: String) {
    let client_id = new_id();
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        client_id = %client_id,
        room_id = %room_id,
        "WebSocket connection opened"
    );

    let (ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_CAPACITY);

    let send_task = spawn_writer(ws_tx, outbound_rx, client_id.to_string());

    document::join(state.rooms(), &room_id, client_id.clone(), outbound_tx.clone()).await;

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(OutboundMessage::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => {
                debug!(
                    component = "websocket",
                    event = "ws.connection.close_frame",
                    client_id = %client_id,
                    "Client sent close frame"
                );
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.connection.error",
                    client_id = %client_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        };

        let client_msg: DocClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                debug!(
                    component = "websocket",
                    event = "ws.message.parse_failed",
                    client_id = %client_id,
                    error = %e,
                    payload_bytes = text.len(),
                    payload_preview = %truncate_for_log(&text, 240),
                    "Dropping unparseable document message"
                );
                continue;
            }
        };

        handle_client_message(client_msg, &state, &room_id, &client_id).await;
    }

    state.rooms().leave(&room_id, &client_id).await;
    send_task.abort();
    info!(
        component = "websocket",
        event = "ws.connection.closed",
        client_id = %client_id,
        room_id = %room_id,
        "WebSocket connection closed"
    );
}

async fn handle_client_message(
    msg: DocClientMessage,
    state: &AppState,
    room_id: &str,
    client_id: &ClientId,
) {
    match msg {
        DocClientMessage::Update { text } => {
            document::apply_update(state.rooms(), room_id, client_id, text).await;
        }
        DocClientMessage::Presence { name, cursor } => {
            presence::broadcast_presence(state.rooms(), room_id, client_id, name, cursor).await;
        }
        DocClientMessage::Unknown => {
            debug!(
                component = "websocket",
                event = "ws.message.unknown",
                client_id = %client_id,
                "Ignoring unknown document message"
            );
        }
    }
}

fn truncate_for_log(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
