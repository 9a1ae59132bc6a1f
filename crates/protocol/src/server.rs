//! Server → Client messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ClientId;

/// Messages sent to an editor on the document/presence channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DocServerMessage {
    /// Room snapshot, sent once to a connection right after it joins
    Init { text: String },

    /// Another member replaced the document
    RemoteUpdate { text: String, from: ClientId },

    /// Another member moved their cursor
    Presence {
        from: ClientId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        cursor: Value,
    },
}

/// Messages sent to a terminal client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalServerMessage {
    Output { data: String },
    Error { error: String },
}
