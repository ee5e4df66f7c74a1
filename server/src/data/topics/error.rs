//! Topic error types

use thiserror::Error;

/// Error type for topic operations
#[derive(Debug, Error)]
pub enum TopicError {
    /// Channel closed (topic no longer has a live sender)
    #[error("channel closed")]
    ChannelClosed,

    /// Receiver lagged behind and missed messages
    #[error("receiver lagged by {0} messages")]
    Lagged(u64),

    /// Topic exists with a different message type
    #[error("topic '{0}' already exists with different type")]
    TypeMismatch(String),
}

impl From<tokio::sync::broadcast::error::RecvError> for TopicError {
    fn from(err: tokio::sync::broadcast::error::RecvError) -> Self {
        match err {
            tokio::sync::broadcast::error::RecvError::Closed => TopicError::ChannelClosed,
            tokio::sync::broadcast::error::RecvError::Lagged(n) => TopicError::Lagged(n),
        }
    }
}
