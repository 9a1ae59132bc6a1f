//! Terminal session manager: `connection -> TerminalSession`.
//!
//! A session owns exactly one PTY-backed process. It is created by a valid
//! start command and torn down by kill, by process exit, by the owning
//! connection closing, or by server shutdown, whichever comes first. Each
//! teardown path removes the session from the map, so the process is
//! signalled at most once.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use pairpad_protocol::TermSize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::pty::{PtyError, PtyEvent, PtyOptions, PtyProcess};
use crate::workspace::{WorkspaceDir, WorkspaceError};

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("invalid workspace")]
    MissingWorkspace,

    #[error("invalid workspace")]
    Workspace(#[from] WorkspaceError),

    #[error("terminal session already running")]
    AlreadyRunning,

    #[error(transparent)]
    Spawn(#[from] PtyError),
}

impl TerminalError {
    /// Unknown or malformed workspaces end the connection; everything else
    /// leaves it open for another attempt.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            TerminalError::MissingWorkspace | TerminalError::Workspace(_)
        )
    }
}

/// Parameters of a start command after defaults are applied.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub workspace: Option<String>,
    pub shell: Option<String>,
    pub size: TermSize,
}

pub struct TerminalSession {
    workspace_root: PathBuf,
    process: PtyProcess,
}

impl TerminalSession {
    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }
}

pub struct TerminalManager {
    sessions: DashMap<ConnectionId, TerminalSession>,
    workspaces: WorkspaceDir,
    default_shell: String,
}

impl TerminalManager {
    pub fn new(workspaces: WorkspaceDir, default_shell: impl Into<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            workspaces,
            default_shell: default_shell.into(),
        }
    }

    /// Validate the workspace and spawn the backing process.
    ///
    /// On success the session belongs to `conn` and the returned receiver
    /// carries its output. The workspace is never created here.
    pub async fn start(
        &self,
        conn: ConnectionId,
        request: StartRequest,
    ) -> Result<mpsc::Receiver<PtyEvent>, TerminalError> {
        // The process may be gone while its exit is still queued for the
        // connection; such a session no longer blocks a new start.
        let stale = match self.sessions.get(&conn) {
            Some(session) if !session.process.has_exited() => {
                return Err(TerminalError::AlreadyRunning)
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            self.teardown(conn, "process_exited");
        }

        let workspace = request
            .workspace
            .filter(|name| !name.is_empty())
            .ok_or(TerminalError::MissingWorkspace)?;
        let workspace_root = self.workspaces.resolve_existing(&workspace)?;

        let options = PtyOptions {
            shell: request
                .shell
                .filter(|shell| !shell.trim().is_empty())
                .unwrap_or_else(|| self.default_shell.clone()),
            cwd: workspace_root.clone(),
            size: request.size,
        };
        let spawn_options = options.clone();
        let (process, events) = tokio::task::spawn_blocking(move || {
            PtyProcess::spawn(&spawn_options)
        })
        .await
        .map_err(|e| PtyError::SpawnFailed {
            shell: options.shell.clone(),
            reason: e.to_string(),
        })??;

        info!(
            component = "terminal",
            event = "terminal.session.started",
            connection_id = conn,
            workspace = %workspace,
            shell = %options.shell,
            pid = ?process.pid(),
            cols = options.size.cols,
            rows = options.size.rows,
            "Terminal session started"
        );

        self.sessions.insert(
            conn,
            TerminalSession {
                workspace_root,
                process,
            },
        );
        Ok(events)
    }

    /// Forward bytes to the process. No session, no effect.
    pub async fn input(&self, conn: ConnectionId, data: String) {
        let Some(input_tx) = self
            .sessions
            .get(&conn)
            .map(|session| session.process.input_sender())
        else {
            return;
        };
        if input_tx.send(Bytes::from(data)).await.is_err() {
            debug!(
                component = "terminal",
                event = "terminal.input.dropped",
                connection_id = conn,
                "PTY writer gone, input dropped"
            );
        }
    }

    /// Apply new geometry. Unusable dimensions and missing sessions are
    /// ignored; returns whether the PTY was resized.
    pub fn resize(&self, conn: ConnectionId, cols: i64, rows: i64) -> bool {
        let Some(size) = TermSize::from_resize(cols, rows) else {
            debug!(
                component = "terminal",
                event = "terminal.resize.ignored",
                connection_id = conn,
                cols,
                rows,
                "Ignoring resize with unusable dimensions"
            );
            return false;
        };
        let Some(session) = self.sessions.get(&conn) else {
            return false;
        };
        match session.process.resize(size) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    component = "terminal",
                    event = "terminal.resize.failed",
                    connection_id = conn,
                    error = %e,
                    "PTY resize failed"
                );
                false
            }
        }
    }

    /// Explicit kill from the client.
    pub fn kill(&self, conn: ConnectionId) -> bool {
        self.teardown(conn, "kill")
    }

    /// The owning connection closed.
    pub fn close(&self, conn: ConnectionId) -> bool {
        self.teardown(conn, "connection_closed")
    }

    /// The process exited on its own; forget the session.
    pub fn mark_exited(&self, conn: ConnectionId) -> bool {
        self.teardown(conn, "process_exited")
    }

    /// Terminate every live session. Used on server shutdown.
    pub fn shutdown_all(&self) -> usize {
        let conns: Vec<ConnectionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        conns
            .into_iter()
            .filter(|conn| self.teardown(*conn, "server_shutdown"))
            .count()
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn is_running(&self, conn: ConnectionId) -> bool {
        self.sessions.contains_key(&conn)
    }

    #[cfg(test)]
    pub fn has_exited(&self, conn: ConnectionId) -> bool {
        self.sessions
            .get(&conn)
            .is_some_and(|session| session.process.has_exited())
    }

    #[cfg(test)]
    pub fn pid(&self, conn: ConnectionId) -> Option<u32> {
        self.sessions.get(&conn).and_then(|session| session.process.pid())
    }

    fn teardown(&self, conn: ConnectionId, reason: &'static str) -> bool {
        let Some((_, mut session)) = self.sessions.remove(&conn) else {
            return false;
        };
        let signalled = session.process.terminate();
        info!(
            component = "terminal",
            event = "terminal.session.ended",
            connection_id = conn,
            reason,
            workspace_root = %session.workspace_root().display(),
            signalled,
            "Terminal session ended"
        );
        true
    }
}
