use crate::types::{MessageDto, RoomId, UserId};
use serde::{Deserialize, Serialize};

/// Frames a client may send over its live connection. The tag set is
/// closed: anything else deserializes to `Unknown` and is answered with an
/// `error` frame instead of dropping the connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "SUBSCRIBE", rename_all = "camelCase")]
    Subscribe { room_id: RoomId },
    #[serde(rename = "UNSUBSCRIBE", rename_all = "camelCase")]
    Unsubscribe { room_id: RoomId },
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "subscribed", rename_all = "camelCase")]
    Subscribed { room_id: RoomId },
    #[serde(rename = "unsubscribed", rename_all = "camelCase")]
    Unsubscribed { room_id: RoomId },
    #[serde(rename = "presence", rename_all = "camelCase")]
    Presence {
        room_id: RoomId,
        user_id: UserId,
        online: bool,
    },
    #[serde(rename = "pong", rename_all = "camelCase")]
    Pong { server_time: u64 },
    #[serde(rename = "message")]
    Message {
        #[serde(flatten)]
        message: MessageDto,
    },
    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownType,
    RoomNotFound,
    Unauthorized,
    Internal,
}
