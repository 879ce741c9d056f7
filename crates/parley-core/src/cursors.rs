use crate::error::ChatError;
use crate::messages::MessageStore;
use crate::time::now_ms;
use parley_api::types::{RoomId, UnreadCountDto, UserId};
use parley_storage::{FileStore, PutIfAbsent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-(user, room) last-seen watermark. Absent = "never viewed": every
/// message not authored by the user counts as unread.
#[derive(Clone)]
pub struct ReadCursorStore {
    store: Arc<Mutex<FileStore>>,
}

impl ReadCursorStore {
    pub fn new(store: Arc<Mutex<FileStore>>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: &UserId, room_id: &RoomId) -> Result<Option<u64>, ChatError> {
        let guard = self.store.lock().await;
        read_cursor(&guard, user_id, room_id)
    }

    /// Read the cursor, lazily seeding it to "now" on first access so a
    /// new member never sees pre-join history as unread. Racing first
    /// reads are settled by the store's conditional insert: the loser
    /// takes the winner's value instead of overwriting it.
    pub async fn get_or_init(&self, user_id: &UserId, room_id: &RoomId) -> Result<u64, ChatError> {
        let mut guard = self.store.lock().await;
        let seeded = now_ms();
        let bytes = serde_json::to_vec(&seeded).map_err(|_| ChatError::Storage)?;
        match guard.put_if_absent(&cursor_key(user_id, room_id), bytes)? {
            PutIfAbsent::Inserted => Ok(seeded),
            PutIfAbsent::Conflict(existing) => {
                serde_json::from_slice(&existing).map_err(|_| ChatError::Storage)
            }
        }
    }

    /// Conditional, monotonic advance: the stored watermark moves only if
    /// absent or strictly earlier than `server_now`, which makes
    /// concurrent mark-read calls commutative. The cursor never moves
    /// backward. Returns the value now stored.
    pub async fn update_last_seen(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        server_now: u64,
    ) -> Result<u64, ChatError> {
        let mut guard = self.store.lock().await;
        let current = read_cursor(&guard, user_id, room_id)?;
        match current {
            Some(existing) if existing >= server_now => Ok(existing),
            _ => {
                let bytes = serde_json::to_vec(&server_now).map_err(|_| ChatError::Storage)?;
                guard.put(&cursor_key(user_id, room_id), bytes)?;
                Ok(server_now)
            }
        }
    }

    pub async fn cursors_for_rooms(
        &self,
        user_id: &UserId,
        room_ids: &[RoomId],
    ) -> Result<HashMap<RoomId, Option<u64>>, ChatError> {
        let guard = self.store.lock().await;
        let mut out = HashMap::with_capacity(room_ids.len());
        for room_id in room_ids {
            out.insert(*room_id, read_cursor(&guard, user_id, room_id)?);
        }
        Ok(out)
    }
}

/// Derives unread counts from the message log and the read cursors; holds
/// no state of its own.
#[derive(Clone)]
pub struct UnreadCounter {
    messages: MessageStore,
}

impl UnreadCounter {
    pub fn new(messages: MessageStore) -> Self {
        Self { messages }
    }

    /// Count of messages in `room_id` with created_at > since, excluding
    /// the user's own. `None` since means never viewed.
    pub async fn count_unread_for_user(
        &self,
        room_id: &RoomId,
        since: Option<u64>,
        user_id: &UserId,
    ) -> Result<u64, ChatError> {
        self.messages
            .count_after_excluding_sender(room_id, since, user_id)
            .await
    }

    /// Batched unread counts. Two strategies, both required to agree
    /// exactly with the single-room count for every requested room:
    ///
    /// - all cursors null: pull only (room, sender) pairs once and
    ///   group-count in memory;
    /// - otherwise: pull rows once bounded by the minimum cursor across
    ///   the batch (null bounding to zero), then filter each row against
    ///   its own room's cursor.
    pub async fn count_unread_by_rooms_for_user(
        &self,
        room_ids: &[RoomId],
        last_seen: &HashMap<RoomId, Option<u64>>,
        user_id: &UserId,
    ) -> Result<Vec<UnreadCountDto>, ChatError> {
        let mut counts: HashMap<RoomId, u64> = room_ids.iter().map(|r| (*r, 0)).collect();
        let all_null = room_ids
            .iter()
            .all(|r| last_seen.get(r).copied().flatten().is_none());

        if all_null {
            for (room_id, sender) in self.messages.sender_pairs(room_ids).await? {
                if &sender != user_id {
                    if let Some(count) = counts.get_mut(&room_id) {
                        *count += 1;
                    }
                }
            }
        } else {
            let bound = room_ids
                .iter()
                .map(|r| last_seen.get(r).copied().flatten().unwrap_or(0))
                .min()
                .unwrap_or(0);
            for (room_id, sender, created_at) in self.messages.rows_after(room_ids, bound).await? {
                if &sender == user_id {
                    continue;
                }
                let own_cursor = last_seen.get(&room_id).copied().flatten();
                let unread = match own_cursor {
                    Some(cursor) => created_at > cursor,
                    None => true,
                };
                if unread {
                    if let Some(count) = counts.get_mut(&room_id) {
                        *count += 1;
                    }
                }
            }
        }

        Ok(room_ids
            .iter()
            .map(|room_id| UnreadCountDto {
                room_id: *room_id,
                unread: counts.get(room_id).copied().unwrap_or(0),
            })
            .collect())
    }
}

fn cursor_key(user_id: &UserId, room_id: &RoomId) -> String {
    format!("cursor:{}:{}", user_id, room_id)
}

fn read_cursor(
    store: &FileStore,
    user_id: &UserId,
    room_id: &RoomId,
) -> Result<Option<u64>, ChatError> {
    match store.get(&cursor_key(user_id, room_id)) {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|_| ChatError::Storage),
        None => Ok(None),
    }
}
