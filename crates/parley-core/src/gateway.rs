use crate::error::ChatError;
use crate::registry::{ConnectionRegistry, LiveConnection};
use crate::rooms::RoomStore;
use crate::time::now_ms;
use parley_api::frames::{ClientFrame, ErrorCode, ServerFrame};
use parley_api::types::RoomId;
use std::sync::Arc;

/// Per-connection protocol handler: dispatches the closed client-frame
/// set against the membership store and the live registry. Replies travel
/// back through the connection's own outbound channel.
pub struct Gateway {
    rooms: RoomStore,
    registry: Arc<ConnectionRegistry>,
}

impl Gateway {
    pub fn new(rooms: RoomStore, registry: Arc<ConnectionRegistry>) -> Self {
        Self { rooms, registry }
    }

    pub async fn handle_frame(&self, conn: &Arc<LiveConnection>, frame: ClientFrame) {
        match frame {
            ClientFrame::Subscribe { room_id } => match self.authorize(conn, &room_id).await {
                Ok(()) => {
                    self.registry.subscribe(room_id, conn);
                    conn.send_frame(&ServerFrame::Subscribed { room_id });
                }
                Err(err) => {
                    conn.send_frame(&error_frame(&err));
                }
            },
            ClientFrame::Unsubscribe { room_id } => {
                self.registry.unsubscribe(room_id, conn);
                conn.send_frame(&ServerFrame::Unsubscribed { room_id });
            }
            ClientFrame::Heartbeat => {
                conn.send_frame(&ServerFrame::Pong {
                    server_time: now_ms(),
                });
            }
            ClientFrame::Unknown => {
                conn.send_frame(&ServerFrame::Error {
                    code: ErrorCode::UnknownType,
                    message: "unrecognized frame type".to_string(),
                });
            }
        }
    }

    /// Transport detected the connection is gone. Idempotent.
    pub fn disconnect(&self, conn: &Arc<LiveConnection>) {
        self.registry.remove_session(conn.session_id());
    }

    async fn authorize(
        &self,
        conn: &Arc<LiveConnection>,
        room_id: &RoomId,
    ) -> Result<(), ChatError> {
        if self.rooms.is_member(room_id, conn.user_id()).await? {
            Ok(())
        } else {
            Err(ChatError::Unauthorized)
        }
    }
}

fn error_frame(err: &ChatError) -> ServerFrame {
    let code = match err {
        ChatError::RoomNotFound => ErrorCode::RoomNotFound,
        ChatError::Unauthorized | ChatError::SenderNotMember => ErrorCode::Unauthorized,
        _ => ErrorCode::Internal,
    };
    ServerFrame::Error {
        code,
        message: err.to_string(),
    }
}
