use thiserror::Error;

use crate::backoffice::database::DatabaseError;
use crate::backoffice::store::StoreError;

pub type Result<T> = core::result::Result<T, BackofficeError>;

#[derive(Error, Debug)]
pub enum BackofficeError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("User {viewer} may not chat with {counterpart}")]
    CounterpartNotAllowed { viewer: String, counterpart: String },

    #[error("A user cannot open a conversation with themselves")]
    SelfConversation,

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Chat widget is closed")]
    WidgetClosed,

    #[error("No conversation selected")]
    NoConversationSelected,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}
