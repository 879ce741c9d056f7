use crate::error::ChatError;
use crate::event::{EventBus, RoomEvent};
use parley_api::frames::ServerFrame;
use parley_api::types::{RoomId, SessionId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

/// One live, authenticated, bidirectional client channel. Identity is
/// fixed at handshake time for the connection's whole lifetime. Ephemeral:
/// never persisted, removed entirely on disconnect.
pub struct LiveConnection {
    session_id: SessionId,
    user_id: UserId,
    outbound: mpsc::UnboundedSender<String>,
}

impl LiveConnection {
    /// Returns the connection handle and the receiver half the transport
    /// drains into the socket.
    pub fn open(user_id: UserId) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                session_id: SessionId::random(),
                user_id,
                outbound,
            }),
            rx,
        )
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Best-effort push; false means the transport side is already gone.
    pub fn send(&self, raw: String) -> bool {
        self.outbound.send(raw).is_ok()
    }

    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(raw) => self.send(raw),
            Err(_) => false,
        }
    }
}

/// Connections currently subscribed to one room. Each room has its own
/// lock so fan-out to unrelated rooms never contends.
#[derive(Default)]
struct RoomPeers {
    conns: Mutex<Vec<Arc<LiveConnection>>>,
}

impl RoomPeers {
    /// Push a serialized frame to every peer, under the room lock so
    /// presence and message frames for this room stay ordered. Returns
    /// (delivered, failed).
    fn push_raw(&self, raw: &str) -> (usize, usize) {
        let conns = self.conns.lock().expect("room peers lock");
        let mut delivered = 0;
        let mut failed = 0;
        for conn in conns.iter() {
            if conn.send(raw.to_string()) {
                delivered += 1;
            } else {
                failed += 1;
            }
        }
        (delivered, failed)
    }
}

/// Process-local registry of live connections: a room→connections index
/// and its inverse, kept consistent with each other. Never a source of
/// truth for membership or history, and single-process by design —
/// replicating fan-out across instances is an external broker's job.
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<RoomPeers>>>,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    bus: EventBus,
}

struct SessionEntry {
    conn: Arc<LiveConnection>,
    rooms: HashSet<RoomId>,
}

impl ConnectionRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Register a connection in a room. Idempotent per session. If this is
    /// the user's first live connection in the room, a `presence online`
    /// frame is broadcast; the decision and the emission happen under the
    /// room lock so presence events per (room, user) are totally ordered.
    pub fn subscribe(&self, room_id: RoomId, conn: &Arc<LiveConnection>) {
        {
            // Mutations hold the rooms write lock end to end so a racing
            // prune can never strand this connection in a detached entry.
            let mut rooms = self.rooms.write().expect("rooms lock");
            let peers = Arc::clone(rooms.entry(room_id).or_default());
            let mut conns = peers.conns.lock().expect("room peers lock");
            if conns
                .iter()
                .any(|c| c.session_id() == conn.session_id())
            {
                return;
            }
            let first_for_user = !conns.iter().any(|c| c.user_id() == conn.user_id());
            conns.push(Arc::clone(conn));
            if first_for_user {
                self.emit_presence(&conns, room_id, conn.user_id().clone(), true);
            }
        }
        let mut sessions = self.sessions.write().expect("sessions lock");
        sessions
            .entry(conn.session_id())
            .or_insert_with(|| SessionEntry {
                conn: Arc::clone(conn),
                rooms: HashSet::new(),
            })
            .rooms
            .insert(room_id);
    }

    /// Deregister a connection from a room. The "still online?" check runs
    /// strictly after the removal; checking before would falsely suppress
    /// the final offline event.
    pub fn unsubscribe(&self, room_id: RoomId, conn: &Arc<LiveConnection>) {
        self.remove_from_room(room_id, conn.session_id(), conn.user_id());
        let mut sessions = self.sessions.write().expect("sessions lock");
        if let Some(entry) = sessions.get_mut(&conn.session_id()) {
            entry.rooms.remove(&room_id);
        }
    }

    /// Disconnect cleanup: detach the session from every room it joined
    /// and prune empty room entries. Safe to call more than once; the
    /// second call finds nothing and is a no-op.
    pub fn remove_session(&self, session_id: SessionId) {
        let entry = {
            let mut sessions = self.sessions.write().expect("sessions lock");
            sessions.remove(&session_id)
        };
        let Some(entry) = entry else {
            return;
        };
        for room_id in entry.rooms {
            self.remove_from_room(room_id, session_id, entry.conn.user_id());
        }
    }

    /// Room disbandment: tell every subscriber the room is gone, then drop
    /// the whole room entry and its inverse-index references.
    pub fn drop_room(&self, room_id: RoomId) {
        let peers = {
            let mut rooms = self.rooms.write().expect("rooms lock");
            rooms.remove(&room_id)
        };
        let Some(peers) = peers else {
            return;
        };
        let conns = {
            let mut guard = peers.conns.lock().expect("room peers lock");
            std::mem::take(&mut *guard)
        };
        let mut sessions = self.sessions.write().expect("sessions lock");
        for conn in conns {
            let _ = conn.send_frame(&ServerFrame::Unsubscribed { room_id });
            if let Some(entry) = sessions.get_mut(&conn.session_id()) {
                entry.rooms.remove(&room_id);
            }
        }
    }

    /// Serialize once, push to every subscribed connection. Per-recipient
    /// failures are counted and logged, never retried, and never abort
    /// delivery to the rest.
    pub fn broadcast(&self, room_id: RoomId, frame: &ServerFrame) -> Result<usize, ChatError> {
        let raw = serde_json::to_string(frame).map_err(|_| ChatError::Storage)?;
        let peers = {
            let rooms = self.rooms.read().expect("rooms lock");
            rooms.get(&room_id).cloned()
        };
        let Some(peers) = peers else {
            return Ok(0);
        };
        let (delivered, failed) = peers.push_raw(&raw);
        if failed > 0 {
            log::warn!("broadcast to room {room_id}: {failed} of {} sends failed", delivered + failed);
        }
        Ok(delivered)
    }

    pub fn is_user_online_in_room(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        let rooms = self.rooms.read().expect("rooms lock");
        let Some(peers) = rooms.get(room_id) else {
            return false;
        };
        let conns = peers.conns.lock().expect("room peers lock");
        conns.iter().any(|c| c.user_id() == user_id)
    }

    pub fn get_online_user_ids(&self, room_id: &RoomId) -> Vec<UserId> {
        let rooms = self.rooms.read().expect("rooms lock");
        let Some(peers) = rooms.get(room_id) else {
            return Vec::new();
        };
        let conns = peers.conns.lock().expect("room peers lock");
        let mut seen = HashSet::new();
        conns
            .iter()
            .filter(|c| seen.insert(c.user_id().clone()))
            .map(|c| c.user_id().clone())
            .collect()
    }

    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        let rooms = self.rooms.read().expect("rooms lock");
        rooms
            .get(room_id)
            .map(|peers| peers.conns.lock().expect("room peers lock").len())
            .unwrap_or(0)
    }

    pub fn rooms_for_session(&self, session_id: &SessionId) -> Vec<RoomId> {
        let sessions = self.sessions.read().expect("sessions lock");
        sessions
            .get(session_id)
            .map(|entry| entry.rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    fn remove_from_room(&self, room_id: RoomId, session_id: SessionId, user_id: &UserId) {
        let mut rooms = self.rooms.write().expect("rooms lock");
        let Some(peers) = rooms.get(&room_id).cloned() else {
            return;
        };
        let now_empty = {
            let mut conns = peers.conns.lock().expect("room peers lock");
            let before = conns.len();
            conns.retain(|c| c.session_id() != session_id);
            if conns.len() == before {
                // Not subscribed here; nothing to recompute.
                return;
            }
            // "Still online?" is computed after the removal; checking
            // before would falsely suppress the final offline event.
            let still_online = conns.iter().any(|c| c.user_id() == user_id);
            if !still_online {
                self.emit_presence(&conns, room_id, user_id.clone(), false);
            }
            conns.is_empty()
        };
        if now_empty {
            rooms.remove(&room_id);
        }
    }

    fn emit_presence(
        &self,
        conns: &[Arc<LiveConnection>],
        room_id: RoomId,
        user_id: UserId,
        online: bool,
    ) {
        let frame = ServerFrame::Presence {
            room_id,
            user_id: user_id.clone(),
            online,
        };
        if let Ok(raw) = serde_json::to_string(&frame) {
            let mut failed = 0;
            for conn in conns {
                if !conn.send(raw.clone()) {
                    failed += 1;
                }
            }
            if failed > 0 {
                log::warn!("presence fan-out to room {room_id}: {failed} sends failed");
            }
        }
        self.bus.publish(RoomEvent::PresenceChanged {
            room_id,
            user_id,
            online,
        });
    }
}
