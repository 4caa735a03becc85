//! Message types exchanged with the messaging transport.

use crate::fetch::AudioFile;

/// A single inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons attached to a message.
pub type Keyboard = Vec<Vec<InlineButton>>;

/// Text message received from a chat.
#[derive(Debug, Clone)]
pub struct IncomingText {
    pub chat_id: String,
    pub user_id: String,
    pub message_id: i64,
    pub text: String,
}

/// Callback query received when user clicks an inline button
#[derive(Debug, Clone)]
pub struct CallbackQuery {
    pub id: String,
    pub from_user_id: String,
    pub from_username: Option<String>,
    pub chat_id: String,
    pub message_id: i64,
    pub data: String,
}

/// Inbound event delivered by a channel.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Text(IncomingText),
    Callback(CallbackQuery),
}

impl InboundEvent {
    /// Chat the event belongs to.
    pub fn chat_id(&self) -> &str {
        match self {
            Self::Text(msg) => &msg.chat_id,
            Self::Callback(cb) => &cb.chat_id,
        }
    }
}

/// Outgoing message to send to a chat.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub chat_id: String,
    pub content: OutgoingContent,
}

impl OutgoingMessage {
    pub fn text(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            content: OutgoingContent::Text { text: text.into() },
        }
    }
}

/// Outgoing message content.
#[derive(Debug, Clone)]
pub enum OutgoingContent {
    /// HTML text
    Text { text: String },
    /// HTML text with an inline keyboard
    Menu { text: String, keyboard: Keyboard },
    /// Image referenced by URL
    Photo { url: String, caption: Option<String> },
    /// Audio file held in memory
    Audio { file: AudioFile },
}

/// Replacement content for an existing message.
#[derive(Debug, Clone)]
pub enum EditContent {
    /// Replace text and drop any keyboard
    Text { text: String },
    /// Replace text and keyboard
    Menu { text: String, keyboard: Keyboard },
}
