//! Tunebot - Telegram bot for finding and downloading tracks.
//!
//! A user sends a song name, the bot searches Spotify, shows the results as
//! pages of inline buttons, and sends back the chosen track as audio.
//!
//! ## Architecture
//!
//! ```text
//! Telegram ─getUpdates─► TelegramChannel ─► BotHandler ─► SearchSessionManager
//!                                               │              │        │
//! Telegram ◄─send/edit──────────────────────────┘     SpotifyClient  TrackFetcher
//!                                                                    (spotdl, ffmpeg)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod bot;
pub mod fetch;
pub mod message;
pub mod search;
pub mod session;
pub mod tagging;
pub mod telegram;
pub mod traits;

// Re-export commonly used types
pub use bot::{BotHandler, CallbackPayload, Command};
pub use fetch::{AudioFile, FetchError, FetchProvider, SpotdlProvider, TrackFetcher};
pub use message::{
    CallbackQuery, EditContent, InboundEvent, IncomingText, InlineButton, Keyboard,
    OutgoingContent, OutgoingMessage,
};
pub use search::{SearchError, SearchProvider, SpotifyClient, Track};
pub use session::{
    Direction, PagingConfig, RenderedPage, SearchSessionManager, SessionError, SessionStore,
};
pub use tagging::{AudioTagger, FfmpegTagger};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tunebot_common::config::Config;

/// Capacity of the inbound event queue.
const EVENT_QUEUE_SIZE: usize = 100;

/// Build the track fetcher from the `fetch` and `tagging` sections.
pub fn build_fetcher(config: &Config) -> TrackFetcher {
    let provider = Arc::new(SpotdlProvider::new(&config.fetch));
    let fetcher = TrackFetcher::new(
        provider,
        config.fetch.resolved_work_dir(),
        Duration::from_secs(config.fetch.timeout_secs),
    );

    if config.tagging.enabled {
        fetcher.with_tagger(Arc::new(FfmpegTagger::new(&config.tagging)))
    } else {
        fetcher
    }
}

/// Build the session store with the configured idle TTL.
pub fn build_session_store(config: &Config) -> SessionStore {
    let ttl_ms = i64::try_from(config.session.ttl_secs)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    SessionStore::new(ttl_ms)
}

/// Spawn a task that evicts idle sessions every `interval`.
pub fn spawn_session_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));

        loop {
            ticker.tick().await;
            store.evict_expired();
        }
    })
}

/// Run the bot until the Telegram listener stops or Ctrl-C is received.
pub async fn start_bot(config: &Config) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(|e| e.with_context("Invalid configuration"))?;

    let bot_token = config.telegram_bot_token()?;
    let (client_id, client_secret) = config.spotify_credentials()?;

    let telegram = Arc::new(
        TelegramChannel::new(bot_token.to_string(), config.telegram.allowed_users.clone())
            .with_api_url(config.telegram.api_url.clone())
            .with_poll_timeout(config.telegram.poll_timeout_secs),
    );
    telegram.init().await?;

    let search = Arc::new(SpotifyClient::with_config(
        client_id,
        client_secret,
        &config.spotify,
    ));
    let store = Arc::new(build_session_store(config));
    let sessions = Arc::new(SearchSessionManager::new(
        search,
        Arc::new(build_fetcher(config)),
        store.clone(),
        PagingConfig {
            page_size: config.search.page_size,
            result_limit: config.search.result_limit,
        },
    ));

    let handler = Arc::new(BotHandler::new(telegram.clone(), sessions));
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);

    let processor_handle = BotHandler::spawn_processor(handler, rx);
    let sweeper_handle = spawn_session_sweeper(
        store,
        Duration::from_secs(config.session.sweep_interval_secs),
    );

    tracing::info!(
        page_size = config.search.page_size,
        result_limit = config.search.result_limit,
        work_dir = %config.fetch.resolved_work_dir().display(),
        tagging = config.tagging.enabled,
        "Tunebot started"
    );

    let result = tokio::select! {
        result = telegram.listen(tx) => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    // Clean up on shutdown
    sweeper_handle.abort();
    processor_handle.abort();

    result
}
