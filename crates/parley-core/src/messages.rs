use crate::error::ChatError;
use crate::policy::Policy;
use crate::time::now_ms;
use parley_api::types::{MessageDto, MessageId, RoomId, SendMessageRequest, UserId};
use parley_api::validation::validate_message_request;
use parley_storage::FileStore;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Append-only per-room message log. Messages are immutable; the only
/// deletion path is a room disbandment purge.
///
/// Total order within a room is (created_at_ms, seq) ascending. Timestamps
/// are server-assigned and clamped non-decreasing per room, and `seq` is
/// the append ordinal, so log order and total order coincide and paging is
/// a plain slice.
#[derive(Clone)]
pub struct MessageStore {
    store: Arc<Mutex<FileStore>>,
    policy: Policy,
}

impl MessageStore {
    pub fn new(store: Arc<Mutex<FileStore>>, policy: Policy) -> Self {
        Self { store, policy }
    }

    /// Validate the quote and persist. Sender membership is the caller's
    /// check; quote integrity is ours because we own the message→room
    /// index. Returns only after the write is durable.
    pub async fn append(&self, req: SendMessageRequest) -> Result<MessageDto, ChatError> {
        validate_message_request(&req, &self.policy.limits())?;
        let mut guard = self.store.lock().await;
        if let Some(quoted_id) = &req.quoted_message_id {
            let quoted_room = quoted_message_room(&guard, quoted_id)?;
            if quoted_room != req.room_id {
                return Err(ChatError::QuoteCrossRoomNotAllowed);
            }
        }
        let mut log = load_log(&guard, &req.room_id)?;
        let last_ts = log.last().map(|m| m.created_at_ms).unwrap_or(0);
        let message = MessageDto {
            id: MessageId::random(),
            room_id: req.room_id,
            sender_id: req.sender_id,
            content: req.content,
            quoted_message_id: req.quoted_message_id,
            mentioned_user_ids: req.mentioned_user_ids,
            created_at_ms: now_ms().max(last_ts),
            seq: log.len() as u64 + 1,
        };
        log.push(message.clone());
        save_log(&mut guard, &req.room_id, &log)?;
        let room_bytes = serde_json::to_vec(&req.room_id).map_err(|_| ChatError::Storage)?;
        guard.put(&reverse_key(&message.id), room_bytes)?;
        Ok(message)
    }

    pub async fn get(&self, message_id: &MessageId) -> Result<MessageDto, ChatError> {
        let guard = self.store.lock().await;
        let room_id = quoted_message_room(&guard, message_id)?;
        let log = load_log(&guard, &room_id)?;
        log.into_iter()
            .find(|m| &m.id == message_id)
            .ok_or(ChatError::MessageNotFound)
    }

    /// Ascending-time page; `page` is 0-based, `size` clamped by policy.
    pub async fn page_messages(
        &self,
        room_id: &RoomId,
        page: usize,
        size: usize,
    ) -> Result<Vec<MessageDto>, ChatError> {
        let size = size.clamp(1, self.policy.max_page_size);
        let guard = self.store.lock().await;
        let log = load_log(&guard, room_id)?;
        Ok(log.into_iter().skip(page * size).take(size).collect())
    }

    pub async fn count_messages(&self, room_id: &RoomId) -> Result<u64, ChatError> {
        let guard = self.store.lock().await;
        Ok(load_log(&guard, room_id)?.len() as u64)
    }

    /// First message strictly after `since_exclusive`; `None` means "from
    /// the beginning".
    pub async fn find_first_since(
        &self,
        room_id: &RoomId,
        since_exclusive: Option<u64>,
    ) -> Result<Option<MessageDto>, ChatError> {
        let guard = self.store.lock().await;
        let log = load_log(&guard, room_id)?;
        Ok(log.into_iter().find(|m| after(m, since_exclusive)))
    }

    /// The "jump to first unread" anchor: first message strictly after the
    /// watermark that the user did not author themselves.
    pub async fn find_first_unread_for_user(
        &self,
        room_id: &RoomId,
        since_exclusive: Option<u64>,
        user_id: &UserId,
    ) -> Result<Option<MessageDto>, ChatError> {
        let guard = self.store.lock().await;
        let log = load_log(&guard, room_id)?;
        Ok(log
            .into_iter()
            .find(|m| after(m, since_exclusive) && &m.sender_id != user_id))
    }

    /// Count of messages with created_at > since not authored by `user_id`.
    pub async fn count_after_excluding_sender(
        &self,
        room_id: &RoomId,
        since_exclusive: Option<u64>,
        user_id: &UserId,
    ) -> Result<u64, ChatError> {
        let guard = self.store.lock().await;
        let log = load_log(&guard, room_id)?;
        Ok(log
            .iter()
            .filter(|m| after(m, since_exclusive) && &m.sender_id != user_id)
            .count() as u64)
    }

    /// Strategy-A pull: only (room, sender) pairs for the candidate rooms,
    /// in one pass over the store.
    pub async fn sender_pairs(
        &self,
        room_ids: &[RoomId],
    ) -> Result<Vec<(RoomId, UserId)>, ChatError> {
        let guard = self.store.lock().await;
        let mut out = Vec::new();
        for room_id in room_ids {
            for message in load_log(&guard, room_id)? {
                out.push((*room_id, message.sender_id));
            }
        }
        Ok(out)
    }

    /// Strategy-B pull: (room, sender, created_at) rows with created_at
    /// strictly after `bound`, in one pass over the store. Callers filter
    /// each row against its own room's cursor afterwards.
    pub async fn rows_after(
        &self,
        room_ids: &[RoomId],
        bound: u64,
    ) -> Result<Vec<(RoomId, UserId, u64)>, ChatError> {
        let guard = self.store.lock().await;
        let mut out = Vec::new();
        for room_id in room_ids {
            for message in load_log(&guard, room_id)? {
                if message.created_at_ms > bound {
                    out.push((*room_id, message.sender_id, message.created_at_ms));
                }
            }
        }
        Ok(out)
    }

    /// Disbandment purge: drop the room log and its reverse-index keys.
    pub async fn purge_room(&self, room_id: &RoomId) -> Result<(), ChatError> {
        let mut guard = self.store.lock().await;
        let log = load_log(&guard, room_id)?;
        for message in &log {
            guard.delete(&reverse_key(&message.id))?;
        }
        guard.delete(&log_key(room_id))?;
        Ok(())
    }
}

fn after(message: &MessageDto, since_exclusive: Option<u64>) -> bool {
    match since_exclusive {
        Some(since) => message.created_at_ms > since,
        None => true,
    }
}

fn log_key(room_id: &RoomId) -> String {
    format!("msgs:{}", room_id)
}

fn reverse_key(message_id: &MessageId) -> String {
    format!("msgroom:{}", message_id)
}

fn load_log(store: &FileStore, room_id: &RoomId) -> Result<Vec<MessageDto>, ChatError> {
    if let Some(bytes) = store.get(&log_key(room_id)) {
        serde_json::from_slice(&bytes).map_err(|_| ChatError::Storage)
    } else {
        Ok(Vec::new())
    }
}

fn save_log(store: &mut FileStore, room_id: &RoomId, log: &[MessageDto]) -> Result<(), ChatError> {
    let bytes = serde_json::to_vec(log).map_err(|_| ChatError::Storage)?;
    store.put(&log_key(room_id), bytes)?;
    Ok(())
}

fn quoted_message_room(store: &FileStore, message_id: &MessageId) -> Result<RoomId, ChatError> {
    let bytes = store
        .get(&reverse_key(message_id))
        .ok_or(ChatError::MessageNotFound)?;
    serde_json::from_slice(&bytes).map_err(|_| ChatError::Storage)
}
