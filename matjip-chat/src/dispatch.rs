//! Outbound delivery: room broadcast and addressed per-session sends.
//!
//! Chat traffic always fans out on the room channel. Recommendation payloads
//! (prompt, card, error) follow the configured delivery mode instead:
//! broadcast into the shared conversation, or addressed to the one session
//! currently bound to the target user. Addressed delivery to a user with no
//! live session is a logged no-op; there is no store-and-forward.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use matjip_common::config::DeliveryMode;

use crate::message::Payload;
use crate::session::SessionRegistry;

/// Per-room broadcast channel capacity. Slow websocket writers lag and drop,
/// they never block the sender.
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Routes payloads to rooms and sessions.
pub struct Dispatcher {
    mode: DeliveryMode,
    registry: Arc<SessionRegistry>,
    /// room id → broadcast sender, created lazily on first use
    rooms: DashMap<i64, broadcast::Sender<Payload>>,
    /// session id → outbound queue of the websocket task
    sessions: DashMap<String, mpsc::UnboundedSender<Payload>>,
}

impl Dispatcher {
    pub fn new(mode: DeliveryMode, registry: Arc<SessionRegistry>) -> Self {
        Self {
            mode,
            registry,
            rooms: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Subscribe to a room's broadcast channel, creating it if needed.
    pub fn subscribe_room(&self, room_id: i64) -> broadcast::Receiver<Payload> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan a payload out to every subscriber of a room.
    pub fn broadcast_to_room(&self, room_id: i64, payload: Payload) {
        match self.rooms.get(&room_id) {
            Some(sender) => {
                // Err only means nobody is subscribed right now.
                if sender.send(payload).is_err() {
                    tracing::debug!(room_id, "Broadcast to room without subscribers");
                }
            }
            None => {
                tracing::debug!(room_id, "Broadcast to room that was never subscribed");
            }
        }
    }

    /// Register the outbound queue of a connected session.
    pub fn register_session(&self, session_id: &str, tx: mpsc::UnboundedSender<Payload>) {
        self.sessions.insert(session_id.to_string(), tx);
    }

    /// Drop a session's outbound queue on disconnect.
    pub fn unregister_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Send a payload to the session currently bound to `user_id`.
    ///
    /// A user without a live session simply misses the payload.
    pub fn send_to_user(&self, user_id: &str, payload: Payload) {
        let Some(session_id) = self.registry.session_for(user_id) else {
            tracing::warn!(user_id = %user_id, "Addressed delivery dropped: no session bound");
            return;
        };

        match self.sessions.get(&session_id) {
            Some(tx) => {
                if tx.send(payload).is_err() {
                    tracing::warn!(
                        user_id = %user_id,
                        session_id = %session_id,
                        "Addressed delivery dropped: session queue closed"
                    );
                }
            }
            None => {
                tracing::warn!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "Addressed delivery dropped: session queue not registered"
                );
            }
        }
    }

    /// Deliver a recommendation payload per the configured mode.
    pub fn deliver(&self, room_id: i64, target_user_id: &str, payload: Payload) {
        match self.mode {
            DeliveryMode::Broadcast => self.broadcast_to_room(room_id, payload),
            DeliveryMode::Addressed => self.send_to_user(target_user_id, payload),
        }
    }
}
