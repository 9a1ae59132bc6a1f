//! Application state

use crate::config::Config;
use crate::room::RoomRegistry;
use crate::terminal::TerminalManager;
use crate::workspace::WorkspaceDir;

/// Shared application state, one per server.
pub struct AppState {
    config: Config,

    /// Live documents keyed by room id
    rooms: RoomRegistry,

    /// Terminal sessions keyed by connection
    terminals: TerminalManager,

    /// Workspace directories on disk
    workspaces: WorkspaceDir,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let workspaces = WorkspaceDir::new(config.workspace_root.clone());
        let terminals = TerminalManager::new(workspaces.clone(), config.default_shell.clone());
        Self {
            config,
            rooms: RoomRegistry::new(),
            terminals,
            workspaces,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn terminals(&self) -> &TerminalManager {
        &self.terminals
    }

    pub fn workspaces(&self) -> &WorkspaceDir {
        &self.workspaces
    }

    /// Terminate every live backing process. Returns how many were running.
    pub fn shutdown(&self) -> usize {
        self.terminals.shutdown_all()
    }
}
