//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving and sending
//! messages through the Telegram Bot API.

pub mod format;

use crate::fetch::AudioFile;
use crate::message::{
    CallbackQuery, EditContent, InboundEvent, IncomingText, Keyboard, OutgoingContent,
    OutgoingMessage,
};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tunebot_common::util::sanitize_for_log;

/// Telegram's limit for a single text message.
const MAX_MESSAGE_LEN: usize = 4096;

/// Telegram's limit for a photo caption.
const MAX_CAPTION_LEN: usize = 1024;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            api_base: DEFAULT_API_URL.to_string(),
            poll_timeout_secs: 30,
            client: reqwest::Client::new(),
        }
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_base = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Long-poll timeout passed to `getUpdates`.
    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_user_allowed(&self, username: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == username)
    }

    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// Verify the bot token by calling `getMe`.
    pub async fn init(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(sanitize_for_log(&e.to_string())))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        tracing::info!("Telegram channel initialized");
        Ok(())
    }

    /// Call a Bot API method with a JSON body and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ApiFailure> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(sanitize_for_log(&e.to_string())))?;

        Self::read_result(resp).await
    }

    async fn read_result(resp: reqwest::Response) -> Result<Value, ApiFailure> {
        let status = resp.status();
        if !status.is_success() {
            let description = resp.text().await.unwrap_or_default();
            return Err(ApiFailure::Rejected {
                status: status.as_u16(),
                description,
            });
        }

        let mut data: Value = resp
            .json()
            .await
            .map_err(|e| ApiFailure::Transport(sanitize_for_log(&e.to_string())))?;
        Ok(data.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    fn message_id(result: &Value) -> i64 {
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .unwrap_or_default()
    }

    /// Send one HTML message, retrying as plain text if Telegram rejects the markup.
    async fn send_html(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, ApiFailure> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard_markup(keyboard);
        }

        match self.call("sendMessage", &body).await {
            Ok(result) => Ok(Self::message_id(&result)),
            Err(failure) if failure.is_parse_error() => {
                tracing::warn!(
                    chat_id = %chat_id,
                    "Telegram HTML parsing failed, retrying without parse_mode: {}",
                    failure
                );
                let mut plain = json!({
                    "chat_id": chat_id,
                    "text": format::to_plain(text),
                });
                if let Some(keyboard) = keyboard {
                    plain["reply_markup"] = keyboard_markup(keyboard);
                }
                let result = self.call("sendMessage", &plain).await?;
                Ok(Self::message_id(&result))
            }
            Err(failure) => Err(failure),
        }
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<i64, ApiFailure> {
        let mut body = json!({
            "chat_id": chat_id,
            "photo": url,
        });
        if let Some(caption) = caption {
            body["caption"] = Value::String(truncate_chars(caption, MAX_CAPTION_LEN).to_string());
            body["parse_mode"] = Value::String("HTML".into());
        }

        let result = self.call("sendPhoto", &body).await?;
        Ok(Self::message_id(&result))
    }

    async fn send_audio(&self, chat_id: &str, file: AudioFile) -> Result<i64, ApiFailure> {
        let size = file.data.len();
        let part = Part::bytes(file.data)
            .file_name(file.file_name.clone())
            .mime_str(audio_mime(&file.file_name))
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("title", file.title)
            .text("performer", file.performer)
            .part("audio", part);

        let resp = self
            .client
            .post(self.api_url("sendAudio"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(sanitize_for_log(&e.to_string())))?;

        let result = Self::read_result(resp).await?;

        tracing::info!(
            chat_id = %chat_id,
            file = %file.file_name,
            size_bytes = size,
            "Telegram audio sent"
        );
        Ok(Self::message_id(&result))
    }

    fn parse_callback_query(callback: &Value) -> Option<CallbackQuery> {
        let id = callback.get("id")?.as_str()?.to_string();
        let data = callback.get("data")?.as_str()?.to_string();

        let from = callback.get("from")?;
        let from_user_id = from.get("id")?.as_i64()?.to_string();
        let from_username = from
            .get("username")
            .and_then(|u| u.as_str())
            .map(String::from);

        let message = callback.get("message")?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();
        let message_id = message.get("message_id")?.as_i64()?;

        Some(CallbackQuery {
            id,
            from_user_id,
            from_username,
            chat_id,
            message_id,
            data,
        })
    }

    /// Turn one `getUpdates` entry into an event, applying the allow-list.
    fn parse_update(&self, update: &Value) -> Option<InboundEvent> {
        if let Some(cb) = update.get("callback_query") {
            let query = Self::parse_callback_query(cb)?;
            let username = query.from_username.as_deref().unwrap_or("unknown");
            if !self.is_any_user_allowed([username, query.from_user_id.as_str()]) {
                tracing::warn!(
                    "Telegram: ignoring callback from unauthorized user: {}",
                    username
                );
                return None;
            }
            return Some(InboundEvent::Callback(query));
        }

        let message = update.get("message")?;
        let text = message.get("text").and_then(Value::as_str)?;

        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)?
            .to_string();
        let message_id = message
            .get("message_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();

        let from = message.get("from");
        let username = from
            .and_then(|f| f.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let user_id = from
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string());

        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }

        if !self.is_any_user_allowed(identities.iter().copied()) {
            tracing::warn!(
                "Telegram: ignoring message from unauthorized user: {}",
                username
            );
            return None;
        }

        tracing::info!(
            channel = "telegram",
            user_id = %user_id.as_deref().unwrap_or(username),
            chat_id = %chat_id,
            text = %text,
            "Message received"
        );

        Some(InboundEvent::Text(IncomingText {
            chat_id,
            user_id: user_id.unwrap_or_else(|| username.to_string()),
            message_id,
            text: text.to_string(),
        }))
    }
}

/// Bot API failure, kept apart from `ChannelError` so callers can inspect it.
#[derive(Debug)]
enum ApiFailure {
    Transport(String),
    Rejected { status: u16, description: String },
}

impl ApiFailure {
    /// Telegram returns "Bad Request: can't parse entities" for HTML errors.
    fn is_parse_error(&self) -> bool {
        matches!(self, Self::Rejected { status: 400, description } if description.contains("parse entities"))
    }

    /// Editing a message to identical content is rejected; treat it as done.
    fn is_not_modified(&self) -> bool {
        matches!(self, Self::Rejected { status: 400, description } if description.contains("message is not modified"))
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Rejected {
                status,
                description,
            } => write!(f, "HTTP {status}: {description}"),
        }
    }
}

impl From<ApiFailure> for ChannelError {
    fn from(failure: ApiFailure) -> Self {
        match &failure {
            ApiFailure::Transport(e) => ChannelError::Connection(e.clone()),
            ApiFailure::Rejected {
                status: 401 | 404, ..
            } => ChannelError::Auth(failure.to_string()),
            ApiFailure::Rejected { .. } => ChannelError::SendFailed(failure.to_string()),
        }
    }
}

fn keyboard_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|btn| {
                    json!({
                        "text": btn.text,
                        "callback_data": btn.callback_data
                    })
                })
                .collect()
        })
        .collect();

    json!({ "inline_keyboard": rows })
}

/// Content type for an uploaded audio file, by extension.
fn audio_mime(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("m4a") => "audio/mp4",
        Some("opus" | "ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        _ => "audio/mpeg",
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Split a message into chunks that fit within Telegram's limit.
///
/// Prefers paragraph, line, sentence, then word boundaries.
fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.chars().count() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        let chunk = truncate_chars(remaining, max_len);
        if chunk.len() == remaining.len() {
            chunks.push(remaining.to_string());
            break;
        }

        let split_pos = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .or_else(|| chunk.rfind(". "))
            .or_else(|| chunk.rfind(' '))
            .filter(|&pos| pos > 0)
            .unwrap_or(chunk.len());

        chunks.push(remaining[..split_pos].to_string());
        remaining = remaining[split_pos..].trim_start();
    }

    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<i64> {
        let chat_id = message.chat_id.as_str();

        let message_id = match message.content {
            OutgoingContent::Text { text } => {
                let mut last_id = 0;
                for chunk in split_message(&text, MAX_MESSAGE_LEN) {
                    last_id = self.send_html(chat_id, &chunk, None).await?;
                }
                last_id
            }
            OutgoingContent::Menu { text, keyboard } => {
                self.send_html(chat_id, &text, Some(&keyboard)).await?
            }
            OutgoingContent::Photo { url, caption } => {
                self.send_photo(chat_id, &url, caption.as_deref()).await?
            }
            OutgoingContent::Audio { file } => self.send_audio(chat_id, file).await?,
        };

        Ok(message_id)
    }

    async fn edit(
        &self,
        chat_id: &str,
        message_id: i64,
        content: EditContent,
    ) -> ChannelResult<()> {
        let body = match content {
            EditContent::Text { text } => json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text,
                "parse_mode": "HTML",
                "reply_markup": { "inline_keyboard": [] }
            }),
            EditContent::Menu { text, keyboard } => json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text,
                "parse_mode": "HTML",
                "reply_markup": keyboard_markup(&keyboard)
            }),
        };

        match self.call("editMessageText", &body).await {
            Ok(_) => Ok(()),
            Err(failure) if failure.is_not_modified() => {
                tracing::debug!(chat_id = %chat_id, message_id, "Edit skipped, content unchanged");
                Ok(())
            }
            Err(failure) => Err(failure.into()),
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> ChannelResult<()> {
        let mut body = json!({
            "callback_query_id": callback_id,
            "show_alert": false
        });

        if let Some(t) = text {
            body["text"] = Value::String(t.to_string());
        }

        self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<InboundEvent>) -> ChannelResult<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message", "callback_query"]
            });

            let updates = match self.call("getUpdates", &body).await {
                Ok(result) => result,
                Err(failure) => {
                    let err = ChannelError::from(failure);
                    if matches!(err, ChannelError::Auth(_)) {
                        return Err(err);
                    }
                    tracing::warn!("Telegram poll error: {}", err);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let Some(results) = updates.as_array() else {
                continue;
            };

            for update in results {
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(event) = self.parse_update(update) else {
                    continue;
                };

                if tx.send(event).await.is_err() {
                    tracing::info!("Event receiver dropped, Telegram listener stopping");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InlineButton;
    use test_case::test_case;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123456:ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefgh";

    fn channel_for(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new(TOKEN.into(), vec!["*".into()]).with_api_url(server.uri())
    }

    fn ok_message(message_id: i64) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({ "ok": true, "result": { "message_id": message_id } }))
    }

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into(), vec![]);
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into(), vec![]);
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );

        let ch = ch.with_api_url("http://localhost:8081/");
        assert_eq!(ch.api_url("getMe"), "http://localhost:8081/bot123:ABC/getMe");
    }

    #[test]
    fn telegram_user_allowed_wildcard() {
        let ch = TelegramChannel::new("t".into(), vec!["*".into()]);
        assert!(ch.is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into(), "42".into()]);
        assert!(ch.is_user_allowed("alice"));
        assert!(!ch.is_user_allowed("eve"));
        assert!(ch.is_any_user_allowed(["eve", "42"]));
    }

    #[test]
    fn parse_text_update() {
        let ch = TelegramChannel::new("t".into(), vec!["*".into()]);
        let update = json!({
            "update_id": 1,
            "message": {
                "message_id": 7,
                "chat": { "id": -100 },
                "from": { "id": 42, "username": "alice" },
                "text": "/search Imagine"
            }
        });

        match ch.parse_update(&update) {
            Some(InboundEvent::Text(msg)) => {
                assert_eq!(msg.chat_id, "-100");
                assert_eq!(msg.user_id, "42");
                assert_eq!(msg.message_id, 7);
                assert_eq!(msg.text, "/search Imagine");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_callback_update() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into()]);
        let update = json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb1",
                "data": "track_3",
                "from": { "id": 42, "username": "alice" },
                "message": { "message_id": 9, "chat": { "id": 5 } }
            }
        });

        match ch.parse_update(&update) {
            Some(InboundEvent::Callback(cb)) => {
                assert_eq!(cb.id, "cb1");
                assert_eq!(cb.data, "track_3");
                assert_eq!(cb.chat_id, "5");
                assert_eq!(cb.message_id, 9);
                assert_eq!(cb.from_username.as_deref(), Some("alice"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unauthorized_and_non_text_updates_are_dropped() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into()]);
        let from_eve = json!({
            "update_id": 3,
            "message": {
                "message_id": 1,
                "chat": { "id": 1 },
                "from": { "id": 99, "username": "eve" },
                "text": "hi"
            }
        });
        assert!(ch.parse_update(&from_eve).is_none());

        let sticker = json!({
            "update_id": 4,
            "message": {
                "message_id": 1,
                "chat": { "id": 1 },
                "from": { "id": 1, "username": "alice" },
                "sticker": {}
            }
        });
        assert!(ch.parse_update(&sticker).is_none());
    }

    #[test]
    fn split_message_short() {
        let result = split_message("Hello, World!", 4096);
        assert_eq!(result, vec!["Hello, World!".to_string()]);
    }

    #[test]
    fn split_message_long() {
        let msg = "word ".repeat(2000);
        let result = split_message(&msg, 4096);
        assert!(result.len() > 1);
        assert!(result.iter().all(|c| c.chars().count() <= 4096));
    }

    #[test]
    fn split_message_multibyte() {
        let msg = "é".repeat(5000);
        let result = split_message(&msg, 4096);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].chars().count(), 4096);
    }

    #[test]
    fn keyboard_markup_shape() {
        let keyboard = vec![
            vec![InlineButton::new("Imagine - John Lennon", "track_0")],
            vec![InlineButton::new("Next »", "next")],
        ];
        let markup = keyboard_markup(&keyboard);
        assert_eq!(markup["inline_keyboard"][0][0]["callback_data"], "track_0");
        assert_eq!(markup["inline_keyboard"][1][0]["text"], "Next »");
    }

    #[tokio::test]
    async fn send_menu_posts_keyboard_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_partial_json(json!({
                "chat_id": "5",
                "parse_mode": "HTML",
                "reply_markup": { "inline_keyboard": [[{ "text": "A", "callback_data": "track_0" }]] }
            })))
            .respond_with(ok_message(77))
            .expect(1)
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let id = ch
            .send(OutgoingMessage {
                chat_id: "5".into(),
                content: OutgoingContent::Menu {
                    text: "Results".into(),
                    keyboard: vec![vec![InlineButton::new("A", "track_0")]],
                },
            })
            .await
            .unwrap();

        assert_eq!(id, 77);
    }

    #[tokio::test]
    async fn html_parse_error_retries_as_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_partial_json(json!({ "parse_mode": "HTML" })))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: can't parse entities: unexpected end tag"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_partial_json(json!({ "text": "Rock & Roll" })))
            .respond_with(ok_message(5))
            .expect(1)
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let id = ch
            .send(OutgoingMessage::text("1", "<b>Rock &amp; Roll</b>"))
            .await
            .unwrap();
        assert_eq!(id, 5);
    }

    #[tokio::test]
    async fn edit_not_modified_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/editMessageText")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: message is not modified"
            })))
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        ch.edit("1", 2, EditContent::Text { text: "same".into() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn edit_failure_is_send_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/editMessageText")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: message to edit not found"
            })))
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let err = ch
            .edit("1", 2, EditContent::Text { text: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed(_)));
    }

    #[tokio::test]
    async fn send_audio_uses_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendAudio")))
            .respond_with(ok_message(11))
            .expect(1)
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let id = ch
            .send(OutgoingMessage {
                chat_id: "1".into(),
                content: OutgoingContent::Audio {
                    file: AudioFile {
                        file_name: "John Lennon - Imagine.mp3".into(),
                        data: b"ID3".to_vec(),
                        title: "Imagine".into(),
                        performer: "John Lennon".into(),
                    },
                },
            })
            .await
            .unwrap();
        assert_eq!(id, 11);

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"performer\""));
        assert!(body.contains("John Lennon - Imagine.mp3"));
        assert!(body.to_ascii_lowercase().contains("content-type: audio/mpeg"));
    }

    #[test_case("Imagine.mp3", "audio/mpeg")]
    #[test_case("Imagine.M4A", "audio/mp4")]
    #[test_case("Imagine.opus", "audio/ogg")]
    #[test_case("Imagine.ogg", "audio/ogg")]
    #[test_case("Imagine.flac", "audio/flac")]
    #[test_case("Imagine.wav", "audio/wav")]
    #[test_case("Imagine", "audio/mpeg" ; "no extension")]
    fn audio_mime_follows_extension(file_name: &str, expected: &str) {
        assert_eq!(audio_mime(file_name), expected);
    }

    #[tokio::test]
    async fn listen_forwards_updates_and_stops_when_receiver_drops() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{
                    "update_id": 10,
                    "message": {
                        "message_id": 1,
                        "chat": { "id": 8 },
                        "from": { "id": 3, "username": "bob" },
                        "text": "Imagine"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let ch = channel_for(&server).with_poll_timeout(0);
        let (tx, mut rx) = mpsc::channel(1);

        let listener = tokio::spawn(async move { ch.listen(tx).await });

        match rx.recv().await {
            Some(InboundEvent::Text(msg)) => assert_eq!(msg.text, "Imagine"),
            other => panic!("unexpected event: {other:?}"),
        }
        drop(rx);

        let result = tokio::time::timeout(Duration::from_secs(5), listener)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn listen_stops_on_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false,
                "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let (tx, _rx) = mpsc::channel(1);
        let err = ch.listen(tx).await.unwrap_err();
        assert!(matches!(err, ChannelError::Auth(_)));
    }
}
