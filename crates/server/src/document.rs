//! Document sync: full-text replication among a room's connections.
//!
//! Every update replaces the room's text outright and is relayed to the
//! other members. There is no merge; concurrent edits resolve to whichever
//! update the server applied last.

use pairpad_protocol::{ClientId, DocServerMessage};
use tracing::{debug, warn};

use crate::outbound::{encode, OutboundMessage};
use crate::room::{ClientTx, RoomRegistry};

/// Join `room_id` and queue `init` with the current text for the joining
/// connection only. The snapshot and its delivery happen under the room
/// lock, so no update can slip in between them.
pub async fn join(registry: &RoomRegistry, room_id: &str, client_id: ClientId, tx: ClientTx) {
    let state = registry.join(room_id, client_id.clone(), tx.clone()).await;
    let init = DocServerMessage::Init {
        text: state.text().to_string(),
    };
    if tx.try_send(OutboundMessage::Json(init)).is_err() {
        warn!(
            component = "document",
            event = "document.init.undeliverable",
            room_id = %room_id,
            client_id = %client_id,
            "Could not queue initial snapshot"
        );
    }
    debug!(
        component = "document",
        event = "document.joined",
        room_id = %room_id,
        client_id = %client_id,
        members = state.client_count(),
        "Client joined room"
    );
}

/// Replace the room's text and relay it to every other member.
/// Returns how many members the update was queued for.
pub async fn apply_update(
    registry: &RoomRegistry,
    room_id: &str,
    from: &ClientId,
    text: String,
) -> usize {
    let room = registry.get_or_create(room_id);
    let mut state = room.lock().await;
    state.set_text(text);

    let message = DocServerMessage::RemoteUpdate {
        text: state.text().to_string(),
        from: from.clone(),
    };
    let Some(frame) = encode(&message) else {
        return 0;
    };
    let delivered = state.broadcast_except(from, &frame);
    debug!(
        component = "document",
        event = "document.updated",
        room_id = %room_id,
        client_id = %from,
        text_bytes = state.text().len(),
        delivered,
        "Applied document update"
    );
    delivered
}
