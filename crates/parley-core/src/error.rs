use thiserror::Error;

/// Domain errors returned synchronously to callers. None of these are
/// retried by the core; retry is a caller decision.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("room not found")]
    RoomNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("not a member")]
    Unauthorized,
    #[error("owner cannot leave")]
    OwnerCannotLeave,
    #[error("owner only operation")]
    OwnerOnlyOperation,
    #[error("sender not a member")]
    SenderNotMember,
    #[error("quoted message belongs to another room")]
    QuoteCrossRoomNotAllowed,
    #[error("validation {0}")]
    Validation(String),
    #[error("storage")]
    Storage,
}

impl From<parley_storage::StorageError> for ChatError {
    fn from(_: parley_storage::StorageError) -> Self {
        ChatError::Storage
    }
}

impl From<parley_api::validation::ValidationError> for ChatError {
    fn from(err: parley_api::validation::ValidationError) -> Self {
        ChatError::Validation(err.to_string())
    }
}
