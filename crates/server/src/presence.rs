//! Presence: relays cursor/name events to the rest of a room.
//! Nothing here reads or writes the room's text.

use pairpad_protocol::{ClientId, DocServerMessage};
use serde_json::Value;
use tracing::trace;

use crate::outbound::encode;
use crate::room::RoomRegistry;

/// Tag the event with the sender's id and relay it. The cursor is passed
/// through untouched, whatever shape it has.
pub async fn broadcast_presence(
    registry: &RoomRegistry,
    room_id: &str,
    from: &ClientId,
    name: Option<String>,
    cursor: Value,
) -> usize {
    let message = DocServerMessage::Presence {
        from: from.clone(),
        name,
        cursor,
    };
    let Some(frame) = encode(&message) else {
        return 0;
    };

    let room = registry.get_or_create(room_id);
    let delivered = room.lock().await.broadcast_except(from, &frame);
    trace!(
        component = "presence",
        event = "presence.relayed",
        room_id = %room_id,
        client_id = %from,
        delivered,
        "Relayed presence"
    );
    delivered
}
