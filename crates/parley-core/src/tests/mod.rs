pub mod cursors_tests;

use crate::config::CoreConfig;
use crate::policy::Policy;
use crate::ChatCore;
use parley_api::frames::ServerFrame;
use parley_api::types::{RoomId, SendMessageRequest, UserId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub fn temp_path(label: &str) -> String {
    format!("/tmp/parley-{}-{}", label, Uuid::new_v4())
}

pub fn test_core(label: &str) -> Arc<ChatCore> {
    let config = CoreConfig {
        storage_path: temp_path(label),
        namespace: "test".to_string(),
    };
    ChatCore::init(config, Policy::default()).expect("core init")
}

pub fn user(name: &str) -> UserId {
    UserId::new(name)
}

pub fn text_message(room_id: RoomId, sender: &UserId, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        room_id,
        sender_id: sender.clone(),
        content: content.to_string(),
        quoted_message_id: None,
        mentioned_user_ids: Vec::new(),
    }
}

/// Drain every frame currently queued on a connection's outbound channel.
pub fn drain_frames(rx: &mut UnboundedReceiver<String>) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        frames.push(serde_json::from_str(&raw).expect("server frame"));
    }
    frames
}
