//! In-process server and WebSocket client helpers for tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::Config;
use crate::state::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub state: Arc<AppState>,
    pub addr: SocketAddr,
    pub dir: tempfile::TempDir,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::for_dir(dir.path());
        std::fs::create_dir_all(&config.workspace_root).expect("workspace root");

        let state = Arc::new(AppState::new(config));
        let app = crate::build_router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            state,
            addr,
            dir,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Create a workspace directory directly on disk.
    pub fn add_workspace(&self, name: &str) -> std::path::PathBuf {
        let path = self.state.config().workspace_root.join(name);
        std::fs::create_dir_all(&path).expect("create workspace");
        path
    }

    pub async fn wait_for_text(&self, room_id: &str, expected: &str) {
        let room = self.state.rooms().get_or_create(room_id);
        for _ in 0..200 {
            if room.lock().await.text() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room_id:?} never reached text {expected:?}");
    }

    pub async fn wait_for_members(&self, room_id: &str, expected: usize) {
        let room = self.state.rooms().get_or_create(room_id);
        for _ in 0..200 {
            if room.lock().await.client_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room_id:?} never reached {expected} members");
    }

    pub async fn wait_for_terminals(&self, expected: usize) {
        for _ in 0..400 {
            if self.state.terminals().active_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} terminal sessions, have {}",
            self.state.terminals().active_count()
        );
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.shutdown();
        self.task.abort();
    }
}

pub async fn connect(url: &str) -> WsClient {
    let (ws, _) = connect_async(url).await.expect("websocket connect");
    ws
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    send_text(ws, &value.to_string()).await;
}

pub async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.into())).await.expect("send");
}

/// Next JSON text frame, or `None` if nothing arrives within `wait`.
pub async fn recv_json_within(ws: &mut WsClient, wait: Duration) -> Option<Value> {
    let next = tokio::time::timeout(wait, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(text.as_str()).expect("server sent JSON"))
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    })
    .await;
    next.ok().flatten()
}

pub async fn recv_json(ws: &mut WsClient) -> Value {
    recv_json_within(ws, RECV_TIMEOUT)
        .await
        .expect("expected a JSON frame")
}

/// Whether the server closes the socket within the receive timeout.
pub async fn closed_by_server(ws: &mut WsClient) -> bool {
    let closed = tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    closed.unwrap_or(false)
}

/// Whether `pid` has exited. A zombie nobody has reaped yet counts as gone.
#[cfg(target_os = "linux")]
pub fn process_gone(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit_once(") ")
            .is_some_and(|(_, fields)| fields.starts_with('Z')),
    }
}

#[cfg(target_os = "linux")]
pub async fn wait_until_gone(pid: u32) -> bool {
    for _ in 0..200 {
        if process_gone(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}
