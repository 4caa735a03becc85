//! Error types shared by tunebot crates.

use thiserror::Error;

/// Result type alias using the tunebot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for configuration and startup.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing credential
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error was caused by configuration.
    pub fn is_config(&self) -> bool {
        match self {
            Self::Config(_) | Self::MissingCredential(_) => true,
            Self::WithContext { source, .. } => source.is_config(),
            _ => false,
        }
    }
}
