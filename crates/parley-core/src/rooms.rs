use crate::error::ChatError;
use crate::policy::Policy;
use crate::time::now_ms;
use parley_api::types::{MembershipDto, Role, RoomDto, RoomId, RoomSummary, UserId};
use parley_api::validation::validate_room_name;
use parley_storage::FileStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A room and its memberships live in one record under one key, so
/// creation (room + owner membership) and disbandment are single-write
/// atomic: either both exist or neither does.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RoomRecord {
    room: RoomDto,
    members: Vec<MembershipDto>,
}

const INDEX_KEY: &str = "rooms:index";

#[derive(Clone)]
pub struct RoomStore {
    store: Arc<Mutex<FileStore>>,
    policy: Policy,
}

impl RoomStore {
    pub fn new(store: Arc<Mutex<FileStore>>, policy: Policy) -> Self {
        Self { store, policy }
    }

    pub async fn create_room(&self, name: String, owner_id: UserId) -> Result<RoomDto, ChatError> {
        validate_room_name(&name, &self.policy.limits())?;
        let now = now_ms();
        let record = RoomRecord {
            room: RoomDto {
                id: RoomId::random(),
                name,
                owner_id: owner_id.clone(),
                created_at_ms: now,
            },
            members: vec![MembershipDto {
                user_id: owner_id,
                role: Role::Owner,
                joined_at_ms: now,
            }],
        };
        let mut guard = self.store.lock().await;
        let mut index = load_index(&guard)?;
        index.insert(record.room.id);
        let bytes = serde_json::to_vec(&record).map_err(|_| ChatError::Storage)?;
        guard.put(&room_key(&record.room.id), bytes)?;
        persist_index(&mut guard, &index)?;
        Ok(record.room)
    }

    /// Idempotent: joining a room the user already belongs to is a no-op.
    pub async fn join_room(&self, room_id: &RoomId, user_id: UserId) -> Result<(), ChatError> {
        let mut guard = self.store.lock().await;
        let mut record = load_room(&guard, room_id)?;
        if record.members.iter().any(|m| m.user_id == user_id) {
            return Ok(());
        }
        record.members.push(MembershipDto {
            user_id,
            role: Role::Member,
            joined_at_ms: now_ms(),
        });
        save_room(&mut guard, &record)
    }

    pub async fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), ChatError> {
        let mut guard = self.store.lock().await;
        let mut record = load_room(&guard, room_id)?;
        let membership = record
            .members
            .iter()
            .find(|m| &m.user_id == user_id)
            .ok_or(ChatError::Unauthorized)?;
        if membership.role == Role::Owner {
            return Err(ChatError::OwnerCannotLeave);
        }
        record.members.retain(|m| &m.user_id != user_id);
        save_room(&mut guard, &record)
    }

    /// Owner-only. Removes the room record (and with it every membership)
    /// in one write. Returns the disbanded room so the caller can purge
    /// its message log and drop live subscriptions.
    pub async fn disband_room(
        &self,
        room_id: &RoomId,
        operator_id: &UserId,
    ) -> Result<RoomDto, ChatError> {
        let mut guard = self.store.lock().await;
        let record = load_room(&guard, room_id)?;
        if &record.room.owner_id != operator_id {
            return Err(ChatError::OwnerOnlyOperation);
        }
        let mut index = load_index(&guard)?;
        index.remove(room_id);
        guard.delete(&room_key(room_id))?;
        persist_index(&mut guard, &index)?;
        Ok(record.room)
    }

    pub async fn get_room(&self, room_id: &RoomId) -> Result<RoomDto, ChatError> {
        let guard = self.store.lock().await;
        Ok(load_room(&guard, room_id)?.room)
    }

    pub async fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, ChatError> {
        let guard = self.store.lock().await;
        let record = load_room(&guard, room_id)?;
        Ok(record.members.iter().any(|m| &m.user_id == user_id))
    }

    pub async fn list_members(&self, room_id: &RoomId) -> Result<Vec<MembershipDto>, ChatError> {
        let guard = self.store.lock().await;
        Ok(load_room(&guard, room_id)?.members)
    }

    pub async fn count_members(&self, room_id: &RoomId) -> Result<usize, ChatError> {
        let guard = self.store.lock().await;
        Ok(load_room(&guard, room_id)?.members.len())
    }

    /// Batched membership listing over many rooms in one store pass.
    /// Unknown room ids are skipped, not errors: the batch is used for
    /// statistics over possibly-stale id sets.
    pub async fn list_members_by_rooms(
        &self,
        room_ids: &[RoomId],
    ) -> Result<HashMap<RoomId, Vec<MembershipDto>>, ChatError> {
        let guard = self.store.lock().await;
        let mut out = HashMap::new();
        for room_id in room_ids {
            if let Ok(record) = load_room(&guard, room_id) {
                out.insert(*room_id, record.members);
            }
        }
        Ok(out)
    }

    /// All rooms, each flagged with whether `user_id` has joined it.
    pub async fn list_rooms_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<RoomSummary>, ChatError> {
        let guard = self.store.lock().await;
        let index = load_index(&guard)?;
        let mut out = Vec::with_capacity(index.len());
        for room_id in &index {
            let Ok(record) = load_room(&guard, room_id) else {
                continue;
            };
            out.push(RoomSummary {
                joined: record.members.iter().any(|m| &m.user_id == user_id),
                member_count: record.members.len(),
                room: record.room,
            });
        }
        out.sort_by_key(|s| s.room.created_at_ms);
        Ok(out)
    }

    pub async fn room_ids(&self) -> Result<Vec<RoomId>, ChatError> {
        let guard = self.store.lock().await;
        Ok(load_index(&guard)?.into_iter().collect())
    }
}

fn room_key(room_id: &RoomId) -> String {
    format!("room:{}", room_id)
}

fn load_room(store: &FileStore, room_id: &RoomId) -> Result<RoomRecord, ChatError> {
    let bytes = store.get(&room_key(room_id)).ok_or(ChatError::RoomNotFound)?;
    serde_json::from_slice(&bytes).map_err(|_| ChatError::Storage)
}

fn save_room(store: &mut FileStore, record: &RoomRecord) -> Result<(), ChatError> {
    let bytes = serde_json::to_vec(record).map_err(|_| ChatError::Storage)?;
    store.put(&room_key(&record.room.id), bytes)?;
    Ok(())
}

fn load_index(store: &FileStore) -> Result<BTreeSet<RoomId>, ChatError> {
    if let Some(bytes) = store.get(INDEX_KEY) {
        serde_json::from_slice(&bytes).map_err(|_| ChatError::Storage)
    } else {
        Ok(BTreeSet::new())
    }
}

fn persist_index(store: &mut FileStore, index: &BTreeSet<RoomId>) -> Result<(), ChatError> {
    let bytes = serde_json::to_vec(index).map_err(|_| ChatError::Storage)?;
    store.put(INDEX_KEY, bytes)?;
    Ok(())
}
