use crate::types::{SendMessageRequest, ValidationLimits};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty field {0}")]
    Empty(&'static str),
    #[error("too long {0}")]
    TooLong(&'static str),
    #[error("too many {0}")]
    TooMany(&'static str),
}

pub fn validate_room_name(name: &str, limits: &ValidationLimits) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Empty("room_name"));
    }
    if name.len() > limits.max_room_name_len {
        return Err(ValidationError::TooLong("room_name"));
    }
    Ok(())
}

pub fn validate_message_request(
    req: &SendMessageRequest,
    limits: &ValidationLimits,
) -> Result<(), ValidationError> {
    if req.sender_id.as_str().trim().is_empty() {
        return Err(ValidationError::Empty("sender_id"));
    }
    if req.content.trim().is_empty() {
        return Err(ValidationError::Empty("content"));
    }
    if req.content.len() > limits.max_content_bytes {
        return Err(ValidationError::TooLong("content"));
    }
    if req.mentioned_user_ids.len() > limits.max_mentions {
        return Err(ValidationError::TooMany("mentions"));
    }
    Ok(())
}
