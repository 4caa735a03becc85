//! Event dispatcher.
//!
//! Turns inbound chat events into session-manager calls and renders the
//! results back through the [`Channel`]. Each event runs in its own task so a
//! slow download never holds up other chats.

use crate::message::{
    CallbackQuery, EditContent, InboundEvent, IncomingText, InlineButton, Keyboard,
    OutgoingContent, OutgoingMessage,
};
use crate::search::Track;
use crate::session::{Direction, RenderedPage, SearchSessionManager, SessionError};
use crate::telegram::format;
use crate::traits::Channel;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tunebot_common::logging::generate_trace_id;
use tunebot_common::util::truncate_with_ellipsis;

/// Longest track button label, ellipsis included.
pub const MAX_BUTTON_LABEL_CHARS: usize = 60;

const USAGE: &str = "Send me a song name and I'll search Spotify for it.\n\n\
Commands:\n\
/search <song> - search for a track\n\
/help - show this message";

/// A parsed text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// `/search <query>` or plain text
    Search(String),
    /// Any other `/command`, without the slash
    Unknown(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Self::Search(text.to_string());
        };

        let (head, args) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        // `/search@MyBot` in group chats
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "search" => Self::Search(args.trim().to_string()),
            _ => Self::Unknown(name),
        }
    }
}

/// Inline button payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPayload {
    Previous,
    Next,
    /// Absolute index into the session's results
    Track(usize),
}

impl CallbackPayload {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "prev" => Some(Self::Previous),
            "next" => Some(Self::Next),
            _ => data
                .strip_prefix("track_")
                .and_then(|i| i.parse().ok())
                .map(Self::Track),
        }
    }
}

impl fmt::Display for CallbackPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Previous => write!(f, "prev"),
            Self::Next => write!(f, "next"),
            Self::Track(index) => write!(f, "track_{index}"),
        }
    }
}

/// Menu text and keyboard for a results page.
///
/// One button row per track, then a navigation row if there is anywhere to go.
pub fn render_menu(page: &RenderedPage) -> (String, Keyboard) {
    let text = format!(
        "Choose a song for {} (page {}/{}):",
        format::bold(&page.query),
        page.page,
        page.total_pages
    );

    let mut keyboard: Keyboard = page
        .choices
        .iter()
        .map(|choice| {
            vec![InlineButton::new(
                truncate_with_ellipsis(&choice.label, MAX_BUTTON_LABEL_CHARS - 3),
                CallbackPayload::Track(choice.index).to_string(),
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page.has_previous {
        nav.push(InlineButton::new("« Prev", CallbackPayload::Previous.to_string()));
    }
    if page.has_next {
        nav.push(InlineButton::new("Next »", CallbackPayload::Next.to_string()));
    }
    if !nav.is_empty() {
        keyboard.push(nav);
    }

    (text, keyboard)
}

/// Text shown while a selected track downloads.
pub fn selected_text(track: &Track) -> String {
    format!(
        "Selected: {} by {}\nDownloading...",
        format::escape(&track.title),
        format::escape(&track.artist_line())
    )
}

/// Routes chat events to the session manager.
pub struct BotHandler {
    channel: Arc<dyn Channel>,
    sessions: Arc<SearchSessionManager>,
}

impl BotHandler {
    pub fn new(channel: Arc<dyn Channel>, sessions: Arc<SearchSessionManager>) -> Self {
        Self { channel, sessions }
    }

    /// Handle one inbound event to completion.
    pub async fn handle(&self, event: InboundEvent) -> anyhow::Result<()> {
        let trace_id = generate_trace_id();
        match event {
            InboundEvent::Text(msg) => self.handle_text(msg, &trace_id).await,
            InboundEvent::Callback(cb) => self.handle_callback(cb, &trace_id).await,
        }
    }

    async fn handle_text(&self, msg: IncomingText, trace_id: &str) -> anyhow::Result<()> {
        let command = Command::parse(&msg.text);
        tracing::debug!(trace_id = %trace_id, chat_id = %msg.chat_id, ?command, "Handling text");

        match command {
            Command::Start | Command::Help => {
                self.send_text(&msg.chat_id, &format::escape(USAGE)).await
            }
            Command::Unknown(name) => {
                let text = format!(
                    "Unknown command /{}. Send /help for usage.",
                    format::escape(&name)
                );
                self.send_text(&msg.chat_id, &text).await
            }
            Command::Search(query) => self.run_search(&msg.chat_id, &query, trace_id).await,
        }
    }

    async fn run_search(&self, chat_id: &str, query: &str, trace_id: &str) -> anyhow::Result<()> {
        let page = match self.sessions.start_search(chat_id, query).await {
            Ok(page) => page,
            Err(e) => {
                log_session_error(&e, chat_id, trace_id);
                return self.send_text(chat_id, e.user_message()).await;
            }
        };

        tracing::info!(
            trace_id = %trace_id,
            chat_id = %chat_id,
            query = %query,
            total_pages = page.total_pages,
            "Showing results"
        );

        if let Some(ref url) = page.preview_url {
            let photo = OutgoingMessage {
                chat_id: chat_id.to_string(),
                content: OutgoingContent::Photo {
                    url: url.clone(),
                    caption: None,
                },
            };
            // The menu is still useful without artwork
            if let Err(e) = self.channel.send(photo).await {
                tracing::warn!(trace_id = %trace_id, chat_id = %chat_id, error = %e, "Failed to send preview");
            }
        }

        let (text, keyboard) = render_menu(&page);
        let message_id = self
            .channel
            .send(OutgoingMessage {
                chat_id: chat_id.to_string(),
                content: OutgoingContent::Menu { text, keyboard },
            })
            .await?;
        self.sessions
            .attach_menu(chat_id, page.generation, message_id)
            .await;
        Ok(())
    }

    async fn handle_callback(&self, cb: CallbackQuery, trace_id: &str) -> anyhow::Result<()> {
        if let Err(e) = self.channel.answer_callback(&cb.id, None).await {
            tracing::warn!(trace_id = %trace_id, chat_id = %cb.chat_id, error = %e, "Failed to answer callback");
        }

        let payload = CallbackPayload::parse(&cb.data);
        tracing::debug!(trace_id = %trace_id, chat_id = %cb.chat_id, data = %cb.data, "Handling callback");

        match payload {
            Some(CallbackPayload::Previous) => {
                self.navigate(&cb, Direction::Previous, trace_id).await
            }
            Some(CallbackPayload::Next) => self.navigate(&cb, Direction::Next, trace_id).await,
            Some(CallbackPayload::Track(index)) => self.select(&cb, index, trace_id).await,
            None => self.show_error(&cb, &SessionError::InvalidSelection, trace_id).await,
        }
    }

    async fn navigate(
        &self,
        cb: &CallbackQuery,
        direction: Direction,
        trace_id: &str,
    ) -> anyhow::Result<()> {
        match self.sessions.navigate(&cb.chat_id, cb.message_id, direction).await {
            Ok(page) => {
                tracing::debug!(trace_id = %trace_id, chat_id = %cb.chat_id, page = page.page, "Page changed");
                let (text, keyboard) = render_menu(&page);
                self.channel
                    .edit(&cb.chat_id, cb.message_id, EditContent::Menu { text, keyboard })
                    .await?;
                Ok(())
            }
            Err(e) => self.show_error(cb, &e, trace_id).await,
        }
    }

    async fn select(&self, cb: &CallbackQuery, index: usize, trace_id: &str) -> anyhow::Result<()> {
        let track = match self
            .sessions
            .select_track(&cb.chat_id, cb.message_id, index)
            .await
        {
            Ok(track) => track,
            Err(e) => return self.show_error(cb, &e, trace_id).await,
        };

        tracing::info!(
            trace_id = %trace_id,
            chat_id = %cb.chat_id,
            track_id = %track.id,
            title = %track.title,
            "Track selected"
        );

        self.channel
            .edit(
                &cb.chat_id,
                cb.message_id,
                EditContent::Text {
                    text: selected_text(&track),
                },
            )
            .await?;

        self.deliver(&cb.chat_id, &track, trace_id).await
    }

    async fn deliver(&self, chat_id: &str, track: &Track, trace_id: &str) -> anyhow::Result<()> {
        let start = Instant::now();

        let file = match self.sessions.fetch_track(track).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(
                    trace_id = %trace_id,
                    chat_id = %chat_id,
                    track_id = %track.id,
                    error = %e,
                    "Fetch failed"
                );
                return self
                    .send_text(chat_id, &format::escape(&e.user_message()))
                    .await;
            }
        };

        let sent = self
            .channel
            .send(OutgoingMessage {
                chat_id: chat_id.to_string(),
                content: OutgoingContent::Audio { file },
            })
            .await;

        match sent {
            Ok(_) => {
                tracing::info!(
                    trace_id = %trace_id,
                    chat_id = %chat_id,
                    track_id = %track.id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Track delivered"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(trace_id = %trace_id, chat_id = %chat_id, error = %e, "Failed to send audio");
                self.send_text(chat_id, "Failed to send the audio file.").await
            }
        }
    }

    /// Replace the menu with the error text, dropping its stale buttons.
    async fn show_error(
        &self,
        cb: &CallbackQuery,
        error: &SessionError,
        trace_id: &str,
    ) -> anyhow::Result<()> {
        log_session_error(error, &cb.chat_id, trace_id);
        self.channel
            .edit(
                &cb.chat_id,
                cb.message_id,
                EditContent::Text {
                    text: error.user_message().to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        self.channel.send(OutgoingMessage::text(chat_id, text)).await?;
        Ok(())
    }

    /// Spawn a task that processes events from `rx`, one task per event.
    pub fn spawn_processor(
        handler: Arc<Self>,
        mut rx: mpsc::Receiver<InboundEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Event processor started");

            while let Some(event) = rx.recv().await {
                let handler = handler.clone();

                tokio::spawn(async move {
                    let chat_id = event.chat_id().to_string();
                    if let Err(e) = handler.handle(event).await {
                        tracing::error!(chat_id = %chat_id, error = %e, "Failed to process event");
                    }
                });
            }

            tracing::info!("Event processor stopped");
        })
    }
}

fn log_session_error(error: &SessionError, chat_id: &str, trace_id: &str) {
    match error {
        SessionError::Search(e) => {
            tracing::error!(trace_id = %trace_id, chat_id = %chat_id, error = %e, "Search failed");
        }
        other => {
            tracing::info!(trace_id = %trace_id, chat_id = %chat_id, error = %other, "Request rejected");
        }
    }
}
