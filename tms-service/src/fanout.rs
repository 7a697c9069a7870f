//! Real-time WebSocket fan-out bus: connection lifecycle, room membership,
//! broadcast, heartbeat, and presence.
//!
//! Deliberately independent of [`crate::websocket::rooms::RoomManager`]'s
//! actor-message indirection -- a single canonical concurrent map
//! (`DashMap`) is enough here, and it sidesteps the room-existence pitfall
//! the spec calls out: there is exactly one room-key scheme
//! (`event_envelope::conversation_room`), used by every caller, so a
//! `join_conversation` can never admit a session into a room the broadcast
//! path looks up under a different name.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

use crate::conversation_store::ConversationStore;
use crate::error::{Error, Result};
use crate::event_envelope::{conversation_room, EventEnvelope};
use crate::websocket::{ConnectionId, Message as WsMessage};

/// Missed pings before a connection is forcibly closed.
const MAX_MISSED_PINGS: u32 = 2;
/// Bound on a session's outbound queue. Producers never block on a slow
/// reader -- `try_send` either succeeds or triggers the backpressure policy.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

struct ConnectionHandle {
    sender: mpsc::Sender<WsMessage>,
    user_id: String,
    rooms: DashSet<String>,
    missed_pings: AtomicU32,
}

/// What happened when a message was offered to a session's outbound queue.
#[derive(Debug, PartialEq, Eq)]
enum OfferOutcome {
    Sent,
    DroppedTyping,
    ConnectionBackedUp,
}

/// Owns connection registration, room membership, broadcast, heartbeat, and
/// presence refcounting for the WebSocket surface.
pub struct FanOut {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    rooms: DashMap<String, DashSet<ConnectionId>>,
    /// user_id -> number of open sessions, used to emit `user_online` /
    /// `user_offline` exactly once per open/close-all-sessions cycle.
    presence: DashMap<String, usize>,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

impl FanOut {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            presence: DashMap::new(),
        }
    }

    /// Register a newly authenticated connection. The caller has already
    /// run the credential through `AuthGate` before reaching this point --
    /// `FanOut` never accepts an application frame from an unauthenticated
    /// session.
    pub fn register(&self, user_id: &str, sender: mpsc::Sender<WsMessage>) -> ConnectionId {
        let conn_id = ConnectionId::new();
        self.connections.insert(
            conn_id,
            ConnectionHandle {
                sender,
                user_id: user_id.to_string(),
                rooms: DashSet::new(),
                missed_pings: AtomicU32::new(0),
            },
        );

        let mut count = self.presence.entry(user_id.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            drop(count);
            self.broadcast_presence(user_id, true);
        }

        conn_id
    }

    /// Admit a connection into a conversation's room after verifying
    /// membership. Returns the canonical room key so the caller can include
    /// it in the `rooms_joined` handshake reply.
    pub async fn join_conversation(
        &self,
        conn_id: ConnectionId,
        conversation_id: &str,
        conversations: &ConversationStore,
    ) -> Result<String> {
        let handle = self
            .connections
            .get(&conn_id)
            .ok_or_else(|| Error::NotFound("connection not registered".into()))?;

        if !conversations.is_member(conversation_id, &handle.user_id).await? {
            return Err(Error::Forbidden("not a member of this conversation".into()));
        }

        let room = conversation_room(conversation_id);
        handle.rooms.insert(room.clone());
        drop(handle);

        self.rooms.entry(room.clone()).or_default().insert(conn_id);

        // Post-join existence assertion: the room must now be visible in
        // the same structure `broadcast` reads, under the same key.
        debug_assert!(self.rooms.get(&room).is_some_and(|members| members.contains(&conn_id)));

        Ok(room)
    }

    pub fn leave_conversation(&self, conn_id: ConnectionId, conversation_id: &str) {
        let room = conversation_room(conversation_id);
        self.remove_from_room(conn_id, &room);
    }

    fn remove_from_room(&self, conn_id: ConnectionId, room: &str) {
        if let Some(handle) = self.connections.get(&conn_id) {
            handle.rooms.remove(room);
        }
        if let Some(members) = self.rooms.get(room) {
            members.remove(&conn_id);
        }
    }

    /// Idempotent cleanup on disconnect (voluntary close or heartbeat
    /// timeout): remove the connection from every room it joined and
    /// decrement presence, emitting `user_offline` on the last session
    /// close.
    pub fn disconnect(&self, conn_id: ConnectionId) {
        let Some((_, handle)) = self.connections.remove(&conn_id) else { return };

        for room in handle.rooms.iter() {
            if let Some(members) = self.rooms.get(room.key()) {
                members.remove(&conn_id);
            }
        }

        if let Some(mut count) = self.presence.get_mut(&handle.user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                drop(count);
                self.presence.remove(&handle.user_id);
                self.broadcast_presence(&handle.user_id, false);
            }
        }
    }

    /// Broadcast an envelope to every session currently in its room.
    /// Ordering is FIFO within this room from this call site; there is no
    /// cross-room guarantee. A session whose queue is full has its pending
    /// typing events dropped first; if it's still backed up (the queue was
    /// full for a non-typing event, or stays full), the session is closed
    /// rather than left to buffer unboundedly.
    pub fn broadcast(&self, envelope: &EventEnvelope, exclude: Option<ConnectionId>) {
        let Some(members) = self.rooms.get(&envelope.room) else { return };
        let is_typing = matches!(envelope.event.as_str(), "typing_start" | "typing_stop");

        let mut backed_up = Vec::new();
        for member in members.iter() {
            let conn_id = *member.key();
            if Some(conn_id) == exclude {
                continue;
            }
            match self.offer(conn_id, envelope, is_typing) {
                OfferOutcome::ConnectionBackedUp => backed_up.push(conn_id),
                OfferOutcome::Sent | OfferOutcome::DroppedTyping => {}
            }
        }
        drop(members);

        for conn_id in backed_up {
            tracing::warn!(connection = %conn_id, "closing backed-up session");
            self.disconnect(conn_id);
        }
    }

    fn offer(&self, conn_id: ConnectionId, envelope: &EventEnvelope, is_typing: bool) -> OfferOutcome {
        let Some(handle) = self.connections.get(&conn_id) else { return OfferOutcome::Sent };

        let Ok(json) = envelope.to_json() else { return OfferOutcome::Sent };
        match handle.sender.try_send(WsMessage::Text(json.into())) {
            Ok(()) => OfferOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) if is_typing => OfferOutcome::DroppedTyping,
            Err(mpsc::error::TrySendError::Full(_)) => OfferOutcome::ConnectionBackedUp,
            Err(mpsc::error::TrySendError::Closed(_)) => OfferOutcome::ConnectionBackedUp,
        }
    }

    fn broadcast_presence(&self, user_id: &str, online: bool) {
        // Presence has no single conversation room; callers with a
        // conversation-scoped presence feed re-broadcast per-room using
        // `crate::event_envelope::payloads::presence`. This hook exists so
        // `register`/`disconnect` have a single place to observe the
        // online/offline transition.
        tracing::debug!(user_id, online, "presence transition");
    }

    /// Record a pong, resetting the missed-ping counter.
    pub fn record_pong(&self, conn_id: ConnectionId) {
        if let Some(handle) = self.connections.get(&conn_id) {
            handle.missed_pings.store(0, Ordering::Relaxed);
        }
    }

    /// One heartbeat tick: ping every connection, and close any connection
    /// that has missed `MAX_MISSED_PINGS` consecutive pongs. Callers run
    /// this on a 30s interval.
    pub fn heartbeat_tick(&self) {
        let mut to_close = Vec::new();
        for entry in self.connections.iter() {
            let conn_id = *entry.key();
            let missed = entry.value().missed_pings.fetch_add(1, Ordering::Relaxed) + 1;
            if missed > MAX_MISSED_PINGS {
                to_close.push(conn_id);
                continue;
            }
            let _ = entry.value().sender.try_send(WsMessage::Ping(Vec::new().into()));
        }

        for conn_id in to_close {
            tracing::info!(connection = %conn_id, "closing connection after missed pings");
            self.disconnect(conn_id);
        }
    }

    pub fn room_member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.presence.get(user_id).map(|c| *c > 0).unwrap_or(false)
    }
}

/// Channel capacity new connections should be created with, so every
/// producer (broadcast, direct send) shares the same backpressure bound.
pub const fn outbound_queue_capacity() -> usize {
    OUTBOUND_QUEUE_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_emits_one_presence_transition_per_first_session() {
        let fanout = FanOut::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        let c1 = fanout.register("user-1", tx1);
        assert!(fanout.is_online("user-1"));
        let _c2 = fanout.register("user-1", tx2);

        fanout.disconnect(c1);
        assert!(fanout.is_online("user-1"), "second session keeps user online");
    }

    #[test]
    fn heartbeat_closes_after_max_missed_pings() {
        let fanout = FanOut::new();
        let (tx, _rx) = mpsc::channel(8);
        let conn = fanout.register("user-1", tx);

        fanout.heartbeat_tick();
        assert!(fanout.connections.contains_key(&conn));
        fanout.heartbeat_tick();
        assert!(fanout.connections.contains_key(&conn));
        fanout.heartbeat_tick();
        assert!(!fanout.connections.contains_key(&conn), "closed after exceeding missed pings");
    }

    #[test]
    fn disconnect_is_idempotent() {
        let fanout = FanOut::new();
        let (tx, _rx) = mpsc::channel(8);
        let conn = fanout.register("user-1", tx);
        fanout.disconnect(conn);
        fanout.disconnect(conn);
    }
}
