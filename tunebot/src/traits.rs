//! Channel traits for implementing messaging transports.

use crate::message::{EditContent, InboundEvent, OutgoingMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel closed")]
    Closed,
}

/// Messaging transport.
///
/// Chat identifiers are opaque strings; message IDs are the transport's own.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Send a message, returning the ID of the sent message.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<i64>;

    /// Replace the content of a previously sent message.
    async fn edit(&self, chat_id: &str, message_id: i64, content: EditContent)
        -> ChannelResult<()>;

    /// Acknowledge a button press, optionally with a short toast.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> ChannelResult<()>;

    /// Receive inbound events until the receiver is dropped.
    async fn listen(&self, tx: mpsc::Sender<InboundEvent>) -> ChannelResult<()>;
}
