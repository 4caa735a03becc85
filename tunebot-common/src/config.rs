//! Configuration management for tunebot.
//!
//! The bot reads `~/.tunebot/config.json`, with credentials optionally split
//! out into `~/.tunebot/secrets.json` (see [`crate::config_loader`]).
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_BOT_TOKEN` → secrets.telegram_bot_token
//! - `SPOTIFY_CLIENT_ID` → secrets.spotify_client_id
//! - `SPOTIFY_CLIENT_SECRET` → secrets.spotify_client_secret
//! - `TUNEBOT_LOG_LEVEL` → observability.log_level
//! - `TUNEBOT_LOG_FORMAT` → observability.log_format
//! - `TUNEBOT_WORK_DIR` → fetch.work_dir
//! - `TUNEBOT_SPOTDL_PATH` → fetch.program

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Spotify caps a single search page at 50 items.
pub const MAX_RESULT_LIMIT: usize = 50;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".tunebot"),
        |dirs| dirs.home_dir().join(".tunebot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Secrets
// ============================================================================

/// Credentials for the external services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub spotify_client_id: Option<String>,
    #[serde(default)]
    pub spotify_client_secret: Option<String>,
}

// ============================================================================
// Telegram
// ============================================================================

/// Telegram transport configuration.
///
/// Bot token is stored in secrets.telegram_bot_token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Usernames or numeric user IDs allowed to use the bot ("*" for anyone)
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            allowed_users: default_allowed_users(),
            api_url: default_telegram_api_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Spotify
// ============================================================================

/// Spotify Web API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default = "default_spotify_api_url")]
    pub api_url: String,

    #[serde(default = "default_spotify_accounts_url")]
    pub accounts_url: String,

    /// ISO 3166-1 market code to restrict results to playable tracks
    #[serde(default)]
    pub market: Option<String>,

    /// Whole-request timeout for token and search calls
    #[serde(default = "default_spotify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_url: default_spotify_api_url(),
            accounts_url: default_spotify_accounts_url(),
            market: None,
            timeout_secs: default_spotify_timeout_secs(),
        }
    }
}

fn default_spotify_api_url() -> String {
    "https://api.spotify.com".to_string()
}

fn default_spotify_accounts_url() -> String {
    "https://accounts.spotify.com".to_string()
}

fn default_spotify_timeout_secs() -> u64 {
    60
}

// ============================================================================
// Search / Session
// ============================================================================

/// Paging configuration for search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum number of tracks requested per query
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            result_limit: default_result_limit(),
        }
    }
}

fn default_page_size() -> usize {
    5
}

fn default_result_limit() -> usize {
    20
}

/// Session retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a chat's search session is evicted
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

// ============================================================================
// Fetch / Tagging
// ============================================================================

/// Downloader invocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Downloader executable
    #[serde(default = "default_fetch_program")]
    pub program: String,

    /// Audio format requested from the downloader
    #[serde(default = "default_fetch_format")]
    pub format: String,

    /// Output file name template understood by the downloader
    #[serde(default = "default_output_template")]
    pub output_template: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Parent directory for per-fetch working directories.
    /// Defaults to the OS temp directory.
    #[serde(default)]
    pub work_dir: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            program: default_fetch_program(),
            format: default_fetch_format(),
            output_template: default_output_template(),
            timeout_secs: default_fetch_timeout_secs(),
            work_dir: None,
        }
    }
}

impl FetchConfig {
    /// Resolve the work directory, expanding `~` and environment variables.
    pub fn resolved_work_dir(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) => PathBuf::from(shellexpand::full(dir).map_or_else(
                |_| dir.clone(),
                |expanded| expanded.into_owned(),
            )),
            None => std::env::temp_dir(),
        }
    }
}

fn default_fetch_program() -> String {
    "spotdl".to_string()
}

fn default_fetch_format() -> String {
    "mp3".to_string()
}

fn default_output_template() -> String {
    "{artists} - {title}.{output-ext}".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

/// Audio normalization and tag embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_channels")]
    pub channels: u8,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ffmpeg_path: default_ffmpeg_path(),
            channels: default_channels(),
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_channels() -> u8 {
    2
}

fn default_sample_rate() -> u32 {
    44_100
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub spotify: SpotifyConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub tagging: TaggingConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from a specific path, merging `secrets.json` from
    /// the same directory. A missing file yields defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
        }
        let value = crate::config_loader::load_modular_config(path)?;
        let config = serde_json::from_value(value).map_err(|e| {
            Error::from(e).with_context(format!("Failed to parse config from {}", path.display()))
        })?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.secrets.telegram_bot_token = Some(token);
        }
        if let Some(id) = lookup("SPOTIFY_CLIENT_ID") {
            self.secrets.spotify_client_id = Some(id);
        }
        if let Some(secret) = lookup("SPOTIFY_CLIENT_SECRET") {
            self.secrets.spotify_client_secret = Some(secret);
        }
        if let Some(level) = lookup("TUNEBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("TUNEBOT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(dir) = lookup("TUNEBOT_WORK_DIR") {
            self.fetch.work_dir = Some(dir);
        }
        if let Some(program) = lookup("TUNEBOT_SPOTDL_PATH") {
            self.fetch.program = program;
        }
    }

    /// Check that the configuration can run the bot.
    pub fn validate(&self) -> Result<()> {
        self.telegram_bot_token()?;
        self.spotify_credentials()?;

        if self.search.page_size == 0 {
            return Err(Error::Config("search.page_size must be positive".into()));
        }
        if self.search.result_limit == 0 || self.search.result_limit > MAX_RESULT_LIMIT {
            return Err(Error::Config(format!(
                "search.result_limit must be between 1 and {MAX_RESULT_LIMIT}, got {}",
                self.search.result_limit
            )));
        }
        if self.spotify.timeout_secs == 0 {
            return Err(Error::Config("spotify.timeout_secs must be positive".into()));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(Error::Config("fetch.timeout_secs must be positive".into()));
        }
        if self.fetch.program.trim().is_empty() {
            return Err(Error::Config("fetch.program must not be empty".into()));
        }
        Ok(())
    }

    /// Get the Telegram bot token.
    pub fn telegram_bot_token(&self) -> Result<&str> {
        non_empty(self.secrets.telegram_bot_token.as_deref())
            .ok_or(Error::MissingCredential("telegram_bot_token"))
    }

    /// Get the Spotify client credentials as `(client_id, client_secret)`.
    pub fn spotify_credentials(&self) -> Result<(&str, &str)> {
        let id = non_empty(self.secrets.spotify_client_id.as_deref())
            .ok_or(Error::MissingCredential("spotify_client_id"))?;
        let secret = non_empty(self.secrets.spotify_client_secret.as_deref())
            .ok_or(Error::MissingCredential("spotify_client_secret"))?;
        Ok((id, secret))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
