pub mod config;
pub mod cursors;
pub mod error;
pub mod event;
pub mod gateway;
pub mod messages;
pub mod policy;
pub mod registry;
pub mod rooms;
pub mod time;

#[cfg(test)]
mod tests;

use config::CoreConfig;
use cursors::{ReadCursorStore, UnreadCounter};
use error::ChatError;
use event::{EventBus, EventReceiver, RoomEvent};
use gateway::Gateway;
use messages::MessageStore;
use parley_api::types::{
    MembershipDto, MessageDto, RoomDto, RoomId, RoomSummary, SendMessageRequest, UnreadCountDto,
    UserId,
};
use parley_api::frames::ServerFrame;
use parley_storage::FileStore;
use policy::Policy;
use registry::ConnectionRegistry;
use rooms::RoomStore;
use std::collections::HashMap;
use std::sync::Arc;
use time::now_ms;
use tokio::sync::Mutex;

/// The chat core: durable room/message/cursor stores, the in-memory live
/// registry, and the gateway, wired together behind one facade. Identity
/// is supplied already verified by the transport layer; the core performs
/// no credential checks.
pub struct ChatCore {
    rooms: RoomStore,
    messages: MessageStore,
    cursors: ReadCursorStore,
    unread: UnreadCounter,
    registry: Arc<ConnectionRegistry>,
    gateway: Gateway,
    bus: EventBus,
}

impl ChatCore {
    pub fn init(config: CoreConfig, policy: Policy) -> Result<Arc<Self>, ChatError> {
        let store = FileStore::open_or_create(&config.storage_path, &config.namespace)?;
        let store = Arc::new(Mutex::new(store));
        let bus = EventBus::new(policy.event_bus_capacity);
        let rooms = RoomStore::new(Arc::clone(&store), policy.clone());
        let messages = MessageStore::new(Arc::clone(&store), policy.clone());
        let cursors = ReadCursorStore::new(Arc::clone(&store));
        let unread = UnreadCounter::new(messages.clone());
        let registry = Arc::new(ConnectionRegistry::new(bus.clone()));
        let gateway = Gateway::new(rooms.clone(), Arc::clone(&registry));
        Ok(Arc::new(Self {
            rooms,
            messages,
            cursors,
            unread,
            registry,
            gateway,
            bus,
        }))
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn subscribe_events(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    // Room & membership management.

    pub async fn create_room(&self, name: String, owner_id: UserId) -> Result<RoomDto, ChatError> {
        self.rooms.create_room(name, owner_id).await
    }

    pub async fn join_room(&self, room_id: &RoomId, user_id: UserId) -> Result<(), ChatError> {
        self.rooms.join_room(room_id, user_id).await
    }

    pub async fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), ChatError> {
        self.rooms.leave_room(room_id, user_id).await
    }

    /// Owner-only. Durable deletion first (room, memberships, message
    /// log), then the live layer drops any subscribed sessions.
    pub async fn disband_room(
        &self,
        room_id: &RoomId,
        operator_id: &UserId,
    ) -> Result<(), ChatError> {
        let room = self.rooms.disband_room(room_id, operator_id).await?;
        self.messages.purge_room(&room.id).await?;
        self.registry.drop_room(room.id);
        self.bus.publish(RoomEvent::RoomDisbanded(room.id));
        Ok(())
    }

    pub async fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, ChatError> {
        self.rooms.is_member(room_id, user_id).await
    }

    pub async fn list_members(&self, room_id: &RoomId) -> Result<Vec<MembershipDto>, ChatError> {
        self.rooms.list_members(room_id).await
    }

    pub async fn count_members(&self, room_id: &RoomId) -> Result<usize, ChatError> {
        self.rooms.count_members(room_id).await
    }

    pub async fn list_members_by_rooms(
        &self,
        room_ids: &[RoomId],
    ) -> Result<HashMap<RoomId, Vec<MembershipDto>>, ChatError> {
        self.rooms.list_members_by_rooms(room_ids).await
    }

    pub async fn list_rooms_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<RoomSummary>, ChatError> {
        self.rooms.list_rooms_for_user(user_id).await
    }

    // Message send & retrieval.

    /// The §4.2 sequence as a two-phase contract: membership and quote
    /// checks, then the durable append; only after the write has committed
    /// is the created-message signal published and the live fan-out
    /// issued. Fan-out never races ahead of persistence.
    pub async fn send_message(&self, req: SendMessageRequest) -> Result<MessageDto, ChatError> {
        if !self.rooms.is_member(&req.room_id, &req.sender_id).await? {
            return Err(ChatError::SenderNotMember);
        }
        let message = self.messages.append(req).await?;
        self.bus.publish(RoomEvent::MessageCreated(message.clone()));
        let _ = self.registry.broadcast(
            message.room_id,
            &ServerFrame::Message {
                message: message.clone(),
            },
        );
        Ok(message)
    }

    /// Member-gated ascending pages; there is no privileged bypass.
    pub async fn page_messages(
        &self,
        room_id: &RoomId,
        page: usize,
        size: usize,
        requester_id: &UserId,
    ) -> Result<Vec<MessageDto>, ChatError> {
        if !self.rooms.is_member(room_id, requester_id).await? {
            return Err(ChatError::Unauthorized);
        }
        self.messages.page_messages(room_id, page, size).await
    }

    pub async fn find_first_since(
        &self,
        room_id: &RoomId,
        since_exclusive: Option<u64>,
    ) -> Result<Option<MessageDto>, ChatError> {
        self.messages.find_first_since(room_id, since_exclusive).await
    }

    pub async fn find_first_unread_for_user(
        &self,
        room_id: &RoomId,
        since_exclusive: Option<u64>,
        user_id: &UserId,
    ) -> Result<Option<MessageDto>, ChatError> {
        self.messages
            .find_first_unread_for_user(room_id, since_exclusive, user_id)
            .await
    }

    // Read cursors & unread counts.

    pub async fn read_cursor(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<Option<u64>, ChatError> {
        self.cursors.get(user_id, room_id).await
    }

    pub async fn get_or_init_cursor(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<u64, ChatError> {
        self.cursors.get_or_init(user_id, room_id).await
    }

    pub async fn mark_read(&self, user_id: &UserId, room_id: &RoomId) -> Result<u64, ChatError> {
        self.cursors
            .update_last_seen(user_id, room_id, now_ms())
            .await
    }

    pub async fn update_last_seen(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        server_now: u64,
    ) -> Result<u64, ChatError> {
        self.cursors
            .update_last_seen(user_id, room_id, server_now)
            .await
    }

    pub async fn count_unread_for_user(
        &self,
        room_id: &RoomId,
        since: Option<u64>,
        user_id: &UserId,
    ) -> Result<u64, ChatError> {
        self.unread.count_unread_for_user(room_id, since, user_id).await
    }

    /// Batched unread counts for a user across rooms, reading the stored
    /// cursors and guaranteeing single-room equivalence.
    pub async fn unread_counts(
        &self,
        room_ids: &[RoomId],
        user_id: &UserId,
    ) -> Result<Vec<UnreadCountDto>, ChatError> {
        let cursors = self.cursors.cursors_for_rooms(user_id, room_ids).await?;
        self.unread
            .count_unread_by_rooms_for_user(room_ids, &cursors, user_id)
            .await
    }

    pub async fn count_unread_by_rooms_for_user(
        &self,
        room_ids: &[RoomId],
        last_seen: &HashMap<RoomId, Option<u64>>,
        user_id: &UserId,
    ) -> Result<Vec<UnreadCountDto>, ChatError> {
        self.unread
            .count_unread_by_rooms_for_user(room_ids, last_seen, user_id)
            .await
    }
}
