//! Search session manager.
//!
//! Owns the per-chat search-and-select workflow:
//!
//! ```text
//! query ──► start_search ──► SearchProvider ──► Session{results, page=1}
//!                                                   │
//!   prev/next ──► navigate (clamped) ───────────────┤──► RenderedPage
//!                                                   │
//!   track_<i> ──► select_track ──► Track ──► fetch_track ──► AudioFile
//! ```

pub mod store;

pub use store::{Session, SessionSlot, SessionStore};

use crate::fetch::{AudioFile, FetchError, TrackFetcher};
use crate::search::{SearchError, SearchProvider, Track};
use std::sync::Arc;

/// Page navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// One selectable track on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Absolute position in the session's results
    pub index: usize,
    pub label: String,
}

/// A page of results plus navigation controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub query: String,
    pub page: usize,
    pub total_pages: usize,
    pub choices: Vec<Choice>,
    pub has_previous: bool,
    pub has_next: bool,
    pub preview_url: Option<String>,
    /// Session generation; pass to [`SearchSessionManager::attach_menu`]
    pub generation: u64,
}

/// Workflow errors. Each carries a user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Empty search query")]
    Validation,

    #[error("No results for query")]
    NoResults,

    #[error("No active search session")]
    NoActiveSession,

    #[error("Invalid track selection")]
    InvalidSelection,

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),
}

impl SessionError {
    /// Text shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation => "Please provide a song name to search for, e.g. /search Imagine",
            Self::NoResults => "No results found. Try a different search.",
            Self::NoActiveSession => "No results to show. Please search again.",
            Self::InvalidSelection => "That selection is no longer available. Please search again.",
            Self::Search(_) => "Search is unavailable right now. Please try again later.",
        }
    }
}

/// Paging settings.
#[derive(Debug, Clone, Copy)]
pub struct PagingConfig {
    pub page_size: usize,
    pub result_limit: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: 5,
            result_limit: 20,
        }
    }
}

/// Mediates between chat events and the search/fetch providers.
pub struct SearchSessionManager {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<TrackFetcher>,
    store: Arc<SessionStore>,
    paging: PagingConfig,
}

impl SearchSessionManager {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<TrackFetcher>,
        store: Arc<SessionStore>,
        paging: PagingConfig,
    ) -> Self {
        Self {
            search,
            fetcher,
            store,
            paging: PagingConfig {
                page_size: paging.page_size.max(1),
                result_limit: paging.result_limit,
            },
        }
    }

    /// The session store backing this manager.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run a new search for `chat_id`, replacing any previous session.
    ///
    /// An empty result set leaves the previous session untouched.
    pub async fn start_search(
        &self,
        chat_id: &str,
        query: &str,
    ) -> Result<RenderedPage, SessionError> {
        if query.trim().is_empty() {
            return Err(SessionError::Validation);
        }

        let results = self.search.search(query, self.paging.result_limit).await?;

        tracing::info!(
            chat_id = %chat_id,
            query = %query,
            provider = self.search.name(),
            results = results.len(),
            "Search completed"
        );

        if results.is_empty() {
            return Err(SessionError::NoResults);
        }

        let session = Session::new(query, results);
        let mut page = self.render(&session);
        page.generation = self.store.replace(chat_id, session);
        Ok(page)
    }

    /// Bind the menu message showing `generation` to the chat's session.
    ///
    /// Returns false when a newer search has already replaced that session.
    pub async fn attach_menu(&self, chat_id: &str, generation: u64, message_id: i64) -> bool {
        let Some(slot) = self.store.get(chat_id) else {
            return false;
        };
        let mut session = slot.lock().await;
        if session.generation != generation {
            tracing::debug!(chat_id = %chat_id, generation, "Menu belongs to a replaced session");
            return false;
        }
        session.menu_message_id = Some(message_id);
        true
    }

    /// Move one page back or forward. Moving past either end is a no-op.
    ///
    /// `menu_message_id` is the message whose button was pressed; buttons on
    /// any menu other than the session's current one are rejected.
    pub async fn navigate(
        &self,
        chat_id: &str,
        menu_message_id: i64,
        direction: Direction,
    ) -> Result<RenderedPage, SessionError> {
        let slot = self.store.get(chat_id).ok_or(SessionError::NoActiveSession)?;
        let mut session = slot.lock().await;

        if session.results.is_empty() {
            return Err(SessionError::NoActiveSession);
        }
        check_menu(&session, menu_message_id)?;

        let total_pages = session.total_pages(self.paging.page_size);
        let target = match direction {
            Direction::Previous => session.page.saturating_sub(1).max(1),
            Direction::Next => (session.page + 1).min(total_pages),
        };

        if target == session.page {
            tracing::debug!(chat_id = %chat_id, page = session.page, ?direction, "Navigation clamped");
        }
        session.page = target;

        Ok(self.render(&session))
    }

    /// Return the track at `index` in the chat's current results.
    pub async fn select_track(
        &self,
        chat_id: &str,
        menu_message_id: i64,
        index: usize,
    ) -> Result<Track, SessionError> {
        let slot = self.store.get(chat_id).ok_or(SessionError::InvalidSelection)?;
        let session = slot.lock().await;
        check_menu(&session, menu_message_id)?;
        session
            .results
            .get(index)
            .cloned()
            .ok_or(SessionError::InvalidSelection)
    }

    /// Download a selected track.
    pub async fn fetch_track(&self, track: &Track) -> Result<AudioFile, FetchError> {
        self.fetcher.fetch(track).await
    }

    fn render(&self, session: &Session) -> RenderedPage {
        let page_size = self.paging.page_size;
        let total_pages = session.total_pages(page_size);
        let page = session.page.clamp(1, total_pages);

        let start = (page - 1) * page_size;
        let end = (start + page_size).min(session.results.len());

        let choices = session.results[start..end]
            .iter()
            .enumerate()
            .map(|(offset, track)| Choice {
                index: start + offset,
                label: track.label(),
            })
            .collect();

        RenderedPage {
            query: session.query.clone(),
            page,
            total_pages,
            choices,
            has_previous: page > 1,
            has_next: page < total_pages,
            preview_url: session.results.first().and_then(|t| t.artwork_url.clone()),
            generation: session.generation,
        }
    }
}

/// Indices and pages are only meaningful on the menu that rendered them.
fn check_menu(session: &Session, menu_message_id: i64) -> Result<(), SessionError> {
    if session.menu_message_id == Some(menu_message_id) {
        Ok(())
    } else {
        Err(SessionError::InvalidSelection)
    }
}
