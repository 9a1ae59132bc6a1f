//! Client → Server messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent by an editor on the document/presence channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DocClientMessage {
    /// Full-text replacement of the room's document
    Update { text: String },

    /// Ephemeral cursor/name broadcast. The cursor is relayed as-is.
    Presence {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        cursor: Value,
    },

    /// Any tag this server does not know about
    #[serde(other)]
    Unknown,
}

/// Messages sent by a terminal client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalClientMessage {
    Start {
        #[serde(default)]
        workspace: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shell: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cols: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rows: Option<i64>,
    },
    Input {
        data: String,
    },
    Resize {
        cols: i64,
        rows: i64,
    },
    Kill,

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_update_and_presence() {
        let update: DocClientMessage =
            serde_json::from_str(r#"{"type":"update","text":"hello"}"#).expect("update");
        match update {
            DocClientMessage::Update { text } => assert_eq!(text, "hello"),
            other => panic!("expected update, got {:?}", other),
        }

        let presence: DocClientMessage = serde_json::from_str(
            r#"{"type":"presence","name":"Ann","cursor":{"lineNumber":1,"column":3}}"#,
        )
        .expect("presence");
        match presence {
            DocClientMessage::Presence { name, cursor } => {
                assert_eq!(name.as_deref(), Some("Ann"));
                assert_eq!(cursor, json!({"lineNumber": 1, "column": 3}));
            }
            other => panic!("expected presence, got {:?}", other),
        }
    }

    #[test]
    fn presence_cursor_is_not_validated() {
        let msg: DocClientMessage =
            serde_json::from_str(r#"{"type":"presence","name":"Bo","cursor":"garbage"}"#)
                .expect("presence with odd cursor");
        match msg {
            DocClientMessage::Presence { cursor, .. } => assert_eq!(cursor, json!("garbage")),
            other => panic!("expected presence, got {:?}", other),
        }
    }

    #[test]
    fn unknown_tags_map_to_unknown() {
        let msg: DocClientMessage =
            serde_json::from_str(r#"{"type":"cursor-dance","x":1}"#).expect("unknown doc tag");
        assert!(matches!(msg, DocClientMessage::Unknown));

        let msg: TerminalClientMessage =
            serde_json::from_str(r#"{"type":"reboot"}"#).expect("unknown terminal tag");
        assert!(matches!(msg, TerminalClientMessage::Unknown));
    }

    #[test]
    fn update_without_text_is_rejected() {
        assert!(serde_json::from_str::<DocClientMessage>(r#"{"type":"update"}"#).is_err());
    }

    #[test]
    fn start_fields_are_optional() {
        let msg: TerminalClientMessage =
            serde_json::from_str(r#"{"type":"start"}"#).expect("bare start");
        match msg {
            TerminalClientMessage::Start {
                workspace,
                shell,
                cols,
                rows,
            } => {
                assert!(workspace.is_none());
                assert!(shell.is_none());
                assert!(cols.is_none());
                assert!(rows.is_none());
            }
            other => panic!("expected start, got {:?}", other),
        }

        let msg: TerminalClientMessage = serde_json::from_str(
            r#"{"type":"start","workspace":"demo","shell":"/bin/sh","cols":100,"rows":30}"#,
        )
        .expect("full start");
        match msg {
            TerminalClientMessage::Start {
                workspace,
                shell,
                cols,
                rows,
            } => {
                assert_eq!(workspace.as_deref(), Some("demo"));
                assert_eq!(shell.as_deref(), Some("/bin/sh"));
                assert_eq!(cols, Some(100));
                assert_eq!(rows, Some(30));
            }
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn resize_accepts_negative_dimensions_for_later_filtering() {
        let msg: TerminalClientMessage =
            serde_json::from_str(r#"{"type":"resize","cols":-1,"rows":0}"#).expect("resize");
        assert!(matches!(
            msg,
            TerminalClientMessage::Resize { cols: -1, rows: 0 }
        ));
    }
}
