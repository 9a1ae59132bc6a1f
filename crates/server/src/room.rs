//! Room registry: `room id -> RoomState`.
//!
//! Rooms are created lazily on first use and never removed while the server
//! runs. Each room sits behind its own async mutex; every mutation and every
//! broadcast for a room happens while holding it, which is what gives peers
//! a single receipt order per room.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use pairpad_protocol::ClientId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::outbound::OutboundMessage;

pub type ClientTx = mpsc::Sender<OutboundMessage>;
pub type RoomHandle = Arc<Mutex<RoomState>>;

/// Live document and membership of one room
#[derive(Debug)]
pub struct RoomState {
    id: String,
    text: String,
    clients: HashMap<ClientId, ClientTx>,
}

impl RoomState {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            text: String::new(),
            clients: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the document. No version check: the last write wins.
    pub fn set_text(&mut self, text: String) {
        self.text = text;
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    #[cfg(test)]
    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Queue `frame` for every member except `from`.
    ///
    /// Members whose connection has gone away are dropped from the room
    /// before anything is sent. A member whose queue is full misses this
    /// frame; document frames carry the full text so the next one heals it.
    /// Returns the number of members the frame was queued for.
    pub fn broadcast_except(&mut self, from: &ClientId, frame: &str) -> usize {
        self.clients.retain(|_, tx| !tx.is_closed());

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (client_id, tx) in &self.clients {
            if client_id == from {
                continue;
            }
            match tx.try_send(OutboundMessage::Raw(frame.to_string())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        component = "room",
                        event = "room.broadcast.dropped",
                        room_id = %self.id,
                        client_id = %client_id,
                        "Outbound queue full, frame dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => gone.push(client_id.clone()),
            }
        }
        for client_id in gone {
            self.clients.remove(&client_id);
        }
        delivered
    }

    fn add_client(&mut self, client_id: ClientId, tx: ClientTx) {
        self.clients.insert(client_id, tx);
    }

    fn remove_client(&mut self, client_id: &ClientId) -> bool {
        self.clients.remove(client_id).is_some()
    }
}

/// All rooms known to this server
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room, creating an empty one on first use. Any string is a
    /// valid id, including the empty one.
    pub fn get_or_create(&self, room_id: &str) -> RoomHandle {
        if let Some(room) = self.rooms.get(room_id) {
            return room.value().clone();
        }
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                debug!(
                    component = "room",
                    event = "room.created",
                    room_id = %room_id,
                    "Room created"
                );
                Arc::new(Mutex::new(RoomState::new(room_id)))
            })
            .value()
            .clone()
    }

    /// Add a connection to a room.
    ///
    /// Returns the room still locked so the caller can read the snapshot and
    /// deliver it before any later update to the room is broadcast.
    pub async fn join(
        &self,
        room_id: &str,
        client_id: ClientId,
        tx: ClientTx,
    ) -> OwnedMutexGuard<RoomState> {
        let room = self.get_or_create(room_id);
        let mut state = room.lock_owned().await;
        state.add_client(client_id, tx);
        state
    }

    /// Remove a connection from a room. The room itself stays.
    pub async fn leave(&self, room_id: &str, client_id: &ClientId) -> bool {
        let Some(room) = self.rooms.get(room_id).map(|r| r.value().clone()) else {
            return false;
        };
        let removed = room.lock().await.remove_client(client_id);
        removed
    }

    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = RoomRegistry::new();
        let a = registry.get_or_create("r1");
        let b = registry.get_or_create("r1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.room_count(), 1);
    }

    #[tokio::test]
    async fn empty_room_id_is_a_room_like_any_other() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("");
        assert_eq!(room.lock().await.id(), "");
        assert_eq!(room.lock().await.text(), "");
    }

    #[tokio::test]
    async fn join_then_leave_keeps_room() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let client = ClientId::from("c1");

        {
            let state = registry.join("r1", client.clone(), tx).await;
            assert!(state.contains(&client));
            assert_eq!(state.client_count(), 1);
        }

        assert!(registry.leave("r1", &client).await);
        assert!(!registry.leave("r1", &client).await);
        assert!(!registry.leave("never-made", &client).await);

        let room = registry.get_or_create("r1");
        assert_eq!(room.lock().await.client_count(), 0);
        assert_eq!(registry.room_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_skips_sender_and_prunes_closed_clients() {
        let registry = RoomRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let (tx_c, rx_c) = mpsc::channel(8);
        let a = ClientId::from("a");

        drop(registry.join("r1", a.clone(), tx_a).await);
        drop(registry.join("r1", "b".into(), tx_b).await);
        drop(registry.join("r1", "c".into(), tx_c).await);
        drop(rx_c);

        let room = registry.get_or_create("r1");
        let mut state = room.lock().await;
        assert_eq!(state.broadcast_except(&a, "{}"), 1);
        assert_eq!(state.client_count(), 2);

        assert!(matches!(rx_b.try_recv(), Ok(OutboundMessage::Raw(frame)) if frame == "{}"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_frame_but_keeps_member() {
        let registry = RoomRegistry::new();
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = mpsc::channel(1);
        let a = ClientId::from("a");

        drop(registry.join("r1", a.clone(), tx_a).await);
        drop(registry.join("r1", "b".into(), tx_b).await);

        let room = registry.get_or_create("r1");
        let mut state = room.lock().await;
        assert_eq!(state.broadcast_except(&a, "first"), 1);
        assert_eq!(state.broadcast_except(&a, "second"), 0);
        assert_eq!(state.client_count(), 2);

        assert!(matches!(rx_b.try_recv(), Ok(OutboundMessage::Raw(frame)) if frame == "first"));
    }
}
