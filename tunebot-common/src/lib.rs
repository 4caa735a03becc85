//! Tunebot Common - Shared configuration, error types, and logging for tunebot.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers
//! - Utility functions used across the bot

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{
    Config, FetchConfig, ObservabilityConfig, SearchConfig, SecretsConfig, SessionConfig,
    SpotifyConfig, TaggingConfig, TelegramConfig,
};
pub use error::{Error, Result};

