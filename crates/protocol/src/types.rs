//! Core types shared across the protocol

use std::fmt;

use serde::{Deserialize, Serialize};

/// Room joined when a document connection does not name one.
pub const DEFAULT_ROOM: &str = "default";

/// Terminal geometry used when a start command omits or mangles it.
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// Opaque per-connection identity, assigned at accept time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

impl TermSize {
    /// Geometry requested by a start command. Each missing, non-positive, or
    /// oversized dimension falls back to its default independently.
    pub fn from_request(cols: Option<i64>, rows: Option<i64>) -> Self {
        Self {
            cols: cols.and_then(cell_count).unwrap_or(DEFAULT_COLS),
            rows: rows.and_then(cell_count).unwrap_or(DEFAULT_ROWS),
        }
    }

    /// Geometry requested by a resize command; `None` when either dimension
    /// is unusable, in which case the resize is ignored.
    pub fn from_resize(cols: i64, rows: i64) -> Option<Self> {
        Some(Self {
            cols: cell_count(cols)?,
            rows: cell_count(rows)?,
        })
    }
}

fn cell_count(value: i64) -> Option<u16> {
    if value <= 0 {
        return None;
    }
    u16::try_from(value).ok()
}

// -- HTTP file API bodies --

/// Body of `POST /projects/{project}/file`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteFileRequest {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Success body for file writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileResponse {
    pub ok: bool,
}

/// Error body for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

/// Body of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub ok: bool,
    pub service: String,
    pub routes: Vec<String>,
}
