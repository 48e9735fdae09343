//! Configuration types.
//!
//! Everything is read once at process start from environment variables
//! (optionally seeded from a `.env` file) and passed by reference into each
//! component. Component code never reads the environment itself.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_NEWSLETTER_LABEL: &str = "newsletter";
pub const DEFAULT_PROCESSED_LABEL: &str = "Agent/newsletter processed";
pub const DEFAULT_FALLBACK_URL: &str = "https://example.com";

/// Newsletter bodies are cut to this many characters before extraction.
pub const DEFAULT_MAX_BODY_CHARS: usize = 30_000;

/// Two days covers today and yesterday regardless of timezone skew.
pub const DEFAULT_WINDOW_DAYS: u32 = 2;

/// Mailbox (Gmail) settings.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// Path of the cached OAuth token (google-auth `token.json` format).
    pub token_path: PathBuf,
    pub api_base: String,
    /// Label that marks a message as a newsletter candidate.
    pub newsletter_label: String,
    /// Processing marker shared by the run and the reset tool.
    pub processed_label: String,
    /// How far back `newer_than:` reaches, in days.
    pub window_days: u32,
}

/// Knowledge-base (Notion) settings.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: SecretString,
    pub articles_db_id: String,
    pub summary_db_id: String,
    pub api_base: String,
    /// Used when the oracle gives an article no URL.
    pub fallback_url: String,
}

/// Extraction oracle settings.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: SecretString,
    pub model: String,
    pub max_body_chars: usize,
}

/// Full configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub gmail: GmailConfig,
    pub notion: NotionConfig,
    pub oracle: OracleConfig,
}

impl DigestConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gmail = GmailConfig::from_lookup(&lookup)?;

        let notion = NotionConfig {
            api_key: SecretString::from(required(&lookup, "NOTION_API_KEY")?),
            articles_db_id: required(&lookup, "NOTION_ARTICLES_DB_ID")?,
            summary_db_id: required(&lookup, "NOTION_SUMMARY_DB_ID")?,
            api_base: optional(&lookup, "NOTION_API_BASE")
                .unwrap_or_else(|| DEFAULT_NOTION_API_BASE.to_string()),
            fallback_url: optional(&lookup, "NEWSLETTER_FALLBACK_URL")
                .unwrap_or_else(|| DEFAULT_FALLBACK_URL.to_string()),
        };

        let max_body_chars = match optional(&lookup, "NEWSLETTER_MAX_BODY_CHARS") {
            Some(raw) => parse_positive("NEWSLETTER_MAX_BODY_CHARS", &raw)?,
            None => DEFAULT_MAX_BODY_CHARS,
        };

        let oracle = OracleConfig {
            api_key: SecretString::from(required(&lookup, "GEMINI_API_KEY")?),
            model: optional(&lookup, "GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            max_body_chars,
        };

        Ok(Self {
            gmail,
            notion,
            oracle,
        })
    }
}

impl GmailConfig {
    /// Mailbox-only config, enough for the reset tool.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let window_days = match optional(lookup, "NEWSLETTER_WINDOW_DAYS") {
            Some(raw) => parse_positive("NEWSLETTER_WINDOW_DAYS", &raw)?,
            None => DEFAULT_WINDOW_DAYS,
        };

        Ok(Self {
            token_path: optional(lookup, "GMAIL_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("token.json")),
            api_base: optional(lookup, "GMAIL_API_BASE")
                .unwrap_or_else(|| DEFAULT_GMAIL_API_BASE.to_string()),
            newsletter_label: optional(lookup, "NEWSLETTER_LABEL")
                .unwrap_or_else(|| DEFAULT_NEWSLETTER_LABEL.to_string()),
            processed_label: optional(lookup, "NEWSLETTER_PROCESSED_LABEL")
                .unwrap_or_else(|| DEFAULT_PROCESSED_LABEL.to_string()),
            window_days,
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value: T = raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
