//! Spotify Web API search provider.
//!
//! Authenticates with the client credentials grant and caches the access
//! token until shortly before it expires.

use super::{SearchError, SearchProvider, Track};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tunebot_common::config::SpotifyConfig;

/// Refresh the token this long before Spotify says it expires.
const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
struct TokenCache {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    #[serde(default)]
    external_urls: ExternalUrls,
    #[serde(default)]
    album: Option<AlbumObject>,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    #[serde(default)]
    images: Vec<ImageObject>,
}

#[derive(Debug, Deserialize)]
struct ImageObject {
    url: String,
}

impl From<TrackObject> for Track {
    fn from(item: TrackObject) -> Self {
        let external_url = item
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/track/{}", item.id));
        // Spotify lists album images largest first
        let artwork_url = item
            .album
            .and_then(|album| album.images.into_iter().next())
            .map(|image| image.url);

        Self {
            id: item.id,
            title: item.name,
            artists: item.artists.into_iter().map(|a| a.name).collect(),
            external_url,
            artwork_url,
        }
    }
}

/// Spotify search client.
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    api_url: String,
    accounts_url: String,
    market: Option<String>,
    client: reqwest::Client,
    token_cache: Arc<RwLock<Option<TokenCache>>>,
}

impl SpotifyClient {
    /// Create a new client against the public Spotify endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_config(client_id, client_secret, &SpotifyConfig::default())
    }

    /// Create a new client with explicit endpoints and market.
    pub fn with_config(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        config: &SpotifyConfig,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            accounts_url: config.accounts_url.trim_end_matches('/').to_string(),
            market: config.market.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get or refresh the access token.
    async fn get_access_token(&self) -> Result<String, SearchError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.expires_at > Instant::now() + Duration::from_secs(TOKEN_REFRESH_MARGIN_SECS)
                {
                    return Ok(cached.token.clone());
                }
            }
        }

        let url = format!("{}/api/token", self.accounts_url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SearchError::Auth(format!(
                "token request rejected ({status}): {text}"
            )));
        }

        let data: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::Decode(format!("token response: {e}")))?;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(TokenCache {
                token: data.access_token.clone(),
                expires_at: Instant::now() + Duration::from_secs(data.expires_in),
            });
        }

        tracing::debug!(
            expires_in = data.expires_in,
            "Spotify access token refreshed"
        );
        Ok(data.access_token)
    }

    /// Drop the cached token so the next call re-authenticates.
    async fn invalidate_token(&self) {
        *self.token_cache.write().await = None;
    }

    async fn search_once(
        &self,
        token: &str,
        query: &str,
        limit: usize,
    ) -> Result<reqwest::Response, SearchError> {
        let limit = limit.to_string();
        let mut params: Vec<(&str, &str)> = vec![("q", query), ("type", "track"), ("limit", limit.as_str())];
        if let Some(ref market) = self.market {
            params.push(("market", market.as_str()));
        }

        let resp = self
            .client
            .get(format!("{}/v1/search", self.api_url))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl SearchProvider for SpotifyClient {
    fn name(&self) -> &'static str {
        "spotify"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SearchError> {
        let token = self.get_access_token().await?;
        let mut resp = self.search_once(&token, query, limit).await?;

        // A token revoked before its advertised expiry: refresh once and retry
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!("Spotify rejected cached token, re-authenticating");
            self.invalidate_token().await;
            let token = self.get_access_token().await?;
            resp = self.search_once(&token, query, limit).await?;
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api { status, message });
        }

        let data: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::Decode(format!("search response: {e}")))?;

        let tracks: Vec<Track> = data
            .tracks
            .items
            .into_iter()
            .take(limit)
            .map(Track::from)
            .collect();

        tracing::debug!(query = %query, count = tracks.len(), "Spotify search completed");
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SpotifyClient {
        let config = SpotifyConfig {
            api_url: server.uri(),
            accounts_url: server.uri(),
            market: Some("US".into()),
            timeout_secs: 1,
        };
        SpotifyClient::with_config("id", "secret", &config)
    }

    fn track_json(id: &str, name: &str, artists: &[&str], image: Option<&str>) -> serde_json::Value {
        let images: Vec<_> = image.into_iter().map(|url| json!({ "url": url })).collect();
        json!({
            "id": id,
            "name": name,
            "artists": artists.iter().map(|a| json!({ "name": a })).collect::<Vec<_>>(),
            "external_urls": { "spotify": format!("https://open.spotify.com/track/{id}") },
            "album": { "images": images }
        })
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "tok", "token_type": "Bearer", "expires_in": 3600 })),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn search_maps_tracks() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("q", "Imagine"))
            .and(query_param("type", "track"))
            .and(query_param("limit", "20"))
            .and(query_param("market", "US"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tracks": { "items": [
                    track_json("a1", "Imagine", &["John Lennon"], Some("https://img/1.jpg")),
                    track_json("a2", "Imagine - Live", &["John Lennon", "Plastic Ono Band"], None),
                ]}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tracks = client.search("Imagine", 20).await.unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "Imagine");
        assert_eq!(tracks[0].artwork_url.as_deref(), Some("https://img/1.jpg"));
        assert_eq!(tracks[0].external_url, "https://open.spotify.com/track/a1");
        assert_eq!(tracks[1].artist_line(), "John Lennon, Plastic Ono Band");
        assert!(tracks[1].artwork_url.is_none());
    }

    #[tokio::test]
    async fn token_is_cached_between_searches() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "tracks": { "items": [] } })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.search("one", 5).await.unwrap().is_empty());
        assert!(client.search("two", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_client" })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.search("x", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::Auth(_)));
    }

    #[tokio::test]
    async fn api_failure_surfaces_status() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        match client.search("x", 5).await.unwrap_err() {
            SearchError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn revoked_token_is_refreshed_once() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "status": 401, "message": "The access token expired" }
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tracks": { "items": [track_json("b1", "Yesterday", &["The Beatles"], None)] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tracks = client.search("Yesterday", 5).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Yesterday");
    }

    #[tokio::test]
    async fn stalled_search_times_out() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "tracks": { "items": [] } }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.search("x", 5).await.unwrap_err();
        match &err {
            SearchError::Http(e) => assert!(e.is_timeout()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            crate::session::SessionError::from(err).user_message(),
            "Search is unavailable right now. Please try again later."
        );
    }
}
