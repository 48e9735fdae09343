//! Error types for the newsletter digest pipeline.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors. Always fatal at start-up.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox service errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mailbox API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Access token expired or revoked")]
    AuthExpired,

    #[error("Token cache not found at {0}")]
    TokenNotFound(PathBuf),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl MailboxError {
    /// Whether this error should stop the process before any processing.
    pub fn is_fatal_init(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFound(_) | Self::TokenRefresh(_) | Self::AuthExpired
        )
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// The oracle replied, but not with the expected JSON array.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Malformed extraction reply: {0}")]
    Malformed(String),
}

/// Knowledge-base errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Knowledge-base API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Create-page response carried no page id")]
    MissingPageId,
}

/// Errors surfaced at the per-message boundary of a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Listing candidates failed: {0}")]
    Listing(MailboxError),

    #[error("Fetching message {id} failed: {source}")]
    Fetch {
        id: String,
        #[source]
        source: MailboxError,
    },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
