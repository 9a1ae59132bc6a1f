//! WebSocket handling for the terminal channel
//!
//! One connection drives at most one live terminal session. Client commands
//! and process output are multiplexed in a single loop, so commands apply in
//! the order they were sent and output is forwarded in the order produced.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pairpad_protocol::{TermSize, TerminalClientMessage, TerminalServerMessage};

use crate::outbound::{encode, spawn_writer, OutboundMessage, OUTBOUND_CAPACITY};
use crate::pty::{ExitInfo, PtyEvent};
use crate::state::AppState;
use crate::terminal::{next_connection_id, ConnectionId, StartRequest};

/// How long a closing connection waits for queued frames to go out.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket upgrade handler for `/term`
pub async fn terminal_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_terminal_socket(socket, state))
}

enum Flow {
    Continue,
    Close,
}

async fn handle_terminal_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = next_connection_id();
    info!(
        component = "terminal",
        event = "terminal.connection.opened",
        connection_id = conn_id,
        "Terminal connection opened"
    );

    let (ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_CAPACITY);
    let mut send_task = spawn_writer(ws_tx, outbound_rx, format!("term-{conn_id}"));

    let mut events: Option<mpsc::Receiver<PtyEvent>> = None;

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = outbound_tx.send(OutboundMessage::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(
                            component = "terminal",
                            event = "terminal.connection.error",
                            connection_id = conn_id,
                            error = %e,
                            "WebSocket error"
                        );
                        break;
                    }
                };

                let msg: TerminalClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(
                            component = "terminal",
                            event = "terminal.message.parse_failed",
                            connection_id = conn_id,
                            error = %e,
                            payload_bytes = text.len(),
                            "Dropping unparseable terminal message"
                        );
                        continue;
                    }
                };

                let flow = handle_client_message(msg, &state, conn_id, &outbound_tx, &mut events).await;
                if let Flow::Close = flow {
                    break;
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Some(PtyEvent::Output(data)) => {
                        send_message(&outbound_tx, TerminalServerMessage::Output { data }).await;
                    }
                    Some(PtyEvent::Exited(info)) => {
                        events = None;
                        handle_exit(&state, conn_id, info, &outbound_tx).await;
                    }
                    None => events = None,
                }
            }
        }
    }

    state.terminals().close(conn_id);
    drop(events);
    drop(outbound_tx);
    if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
    info!(
        component = "terminal",
        event = "terminal.connection.closed",
        connection_id = conn_id,
        "Terminal connection closed"
    );
}

async fn handle_client_message(
    msg: TerminalClientMessage,
    state: &AppState,
    conn_id: ConnectionId,
    outbound_tx: &mpsc::Sender<OutboundMessage>,
    events: &mut Option<mpsc::Receiver<PtyEvent>>,
) -> Flow {
    match msg {
        TerminalClientMessage::Start {
            workspace,
            shell,
            cols,
            rows,
        } => {
            let request = StartRequest {
                workspace,
                shell,
                size: TermSize::from_request(cols, rows),
            };
            match state.terminals().start(conn_id, request).await {
                Ok(rx) => {
                    *events = Some(rx);
                    Flow::Continue
                }
                Err(e) => {
                    warn!(
                        component = "terminal",
                        event = "terminal.start.failed",
                        connection_id = conn_id,
                        error = %e,
                        source = ?std::error::Error::source(&e).map(|s| s.to_string()),
                        "Terminal start rejected"
                    );
                    send_message(
                        outbound_tx,
                        TerminalServerMessage::Error {
                            error: e.to_string(),
                        },
                    )
                    .await;
                    if e.closes_connection() {
                        Flow::Close
                    } else {
                        Flow::Continue
                    }
                }
            }
        }
        TerminalClientMessage::Input { data } => {
            state.terminals().input(conn_id, data).await;
            Flow::Continue
        }
        TerminalClientMessage::Resize { cols, rows } => {
            state.terminals().resize(conn_id, cols, rows);
            Flow::Continue
        }
        TerminalClientMessage::Kill => {
            state.terminals().kill(conn_id);
            Flow::Continue
        }
        TerminalClientMessage::Unknown => {
            debug!(
                component = "terminal",
                event = "terminal.message.unknown",
                connection_id = conn_id,
                "Ignoring unknown terminal message"
            );
            Flow::Continue
        }
    }
}

/// The process went away on its own. A session already torn down by kill
/// or close is not reported.
async fn handle_exit(
    state: &AppState,
    conn_id: ConnectionId,
    info: ExitInfo,
    outbound_tx: &mpsc::Sender<OutboundMessage>,
) {
    if !state.terminals().mark_exited(conn_id) || info.success {
        return;
    }
    let error = match info.code {
        Some(code) => format!("process exited with code {code}"),
        None => "process exited abnormally".to_string(),
    };
    send_message(outbound_tx, TerminalServerMessage::Error { error }).await;
}

async fn next_event(events: &mut Option<mpsc::Receiver<PtyEvent>>) -> Option<PtyEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Queue a frame. A closed connection just drops it.
async fn send_message(tx: &mpsc::Sender<OutboundMessage>, msg: TerminalServerMessage) {
    if let Some(json) = encode(&msg) {
        let _ = tx.send(OutboundMessage::Raw(json)).await;
    }
}
