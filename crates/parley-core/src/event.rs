use parley_api::types::{MessageDto, RoomId, UserId};
use tokio::sync::broadcast;

/// Signals published strictly after the corresponding durable write has
/// committed. Background consumers (unread notification, logging) hang off
/// this bus; it is never the live fan-out path itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoomEvent {
    MessageCreated(MessageDto),
    PresenceChanged {
        room_id: RoomId,
        user_id: UserId,
        online: bool,
    },
    RoomDisbanded(RoomId),
}

pub type EventReceiver = broadcast::Receiver<RoomEvent>;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RoomEvent>,
}

impl EventBus {
    pub fn new(size: usize) -> Self {
        let (tx, _) = broadcast::channel(size);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: RoomEvent) {
        let _ = self.tx.send(event);
    }
}
