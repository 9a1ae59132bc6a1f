//! Frames queued for a connection's writer task.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::SinkExt;
use pairpad_protocol::DocServerMessage;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Messages that can be sent through a WebSocket
#[derive(Debug)]
pub enum OutboundMessage {
    /// JSON-serialized DocServerMessage
    Json(DocServerMessage),
    /// Pre-serialized JSON string, shared by every recipient of a broadcast
    Raw(String),
    /// Raw pong response
    Pong(Bytes),
}

/// Serialize a message once so a broadcast does not re-encode per peer.
pub fn encode<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            error!(
                component = "websocket",
                event = "ws.send.serialize_failed",
                error = %e,
                "Failed to serialize server message"
            );
            None
        }
    }
}

/// Spawn the task that owns the socket's write half.
///
/// Frames go out in queue order. When every sender is gone the queue drains
/// and the socket gets a close frame.
pub fn spawn_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
    connection: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let result = match msg {
                OutboundMessage::Json(server_msg) => match encode(&server_msg) {
                    Some(json) => ws_tx.send(Message::Text(json.into())).await,
                    None => continue,
                },
                OutboundMessage::Raw(json) => ws_tx.send(Message::Text(json.into())).await,
                OutboundMessage::Pong(data) => ws_tx.send(Message::Pong(data)).await,
            };

            if result.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection = %connection,
                    "WebSocket send failed, client disconnected"
                );
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    })
}
