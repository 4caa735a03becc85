//! Track search.
//!
//! A [`SearchProvider`] resolves a free-text query into an ordered list of
//! [`Track`]s. [`SpotifyClient`] is the production implementation.

pub mod spotify;

pub use spotify::SpotifyClient;

use async_trait::async_trait;

/// A track returned by a search provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    /// Locator handed to the fetch provider
    pub external_url: String,
    pub artwork_url: Option<String>,
}

impl Track {
    /// Artists joined for display, e.g. `"Queen, David Bowie"`.
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }

    /// Choice label, `"<title> - <artists>"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.artist_line())
    }
}

/// Search provider errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Resolves a query string into tracks.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Search for up to `limit` tracks, in provider ranking order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SearchError>;
}
