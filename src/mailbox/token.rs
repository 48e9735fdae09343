//! Cached OAuth token for the mailbox API.
//!
//! The file is the `token.json` written by google-auth's
//! `Credentials.to_json()`. This module only loads and refreshes it; the
//! initial consent flow lives outside the pipeline.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::MailboxError;

/// Tokens expiring within this many seconds are refreshed up front.
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth2 token payload. `token` and `access_token` are both accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl OAuthToken {
    /// Load the cached token. A missing file is a fatal precondition.
    pub fn load(path: &Path) -> Result<Self, MailboxError> {
        if !path.exists() {
            return Err(MailboxError::TokenNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), MailboxError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Expired, about to expire, or expiry unknown.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry.as_deref().and_then(parse_expiry) {
            Some(expiry) => expiry <= now + chrono::Duration::seconds(EXPIRY_SKEW_SECS),
            None => true,
        }
    }

    /// Exchange the refresh token for a new access token.
    pub async fn refresh(&self, http: &reqwest::Client) -> Result<Self, MailboxError> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or(MailboxError::AuthExpired)?;
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            MailboxError::TokenRefresh("token cache has no client_id".to_string())
        })?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let resp = http.post(&self.token_uri).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailboxError::TokenRefresh(format!("{status}: {body}")));
        }
        let body: RefreshResponse = resp.json().await?;

        let expires_in = body.expires_in.unwrap_or(3600);
        let mut refreshed = self.clone();
        refreshed.token = body.access_token;
        refreshed.expiry = Some((Utc::now() + chrono::Duration::seconds(expires_in)).to_rfc3339());
        Ok(refreshed)
    }

    /// Load the cache and refresh it if needed, writing the result back.
    pub async fn load_fresh(path: &Path, http: &reqwest::Client) -> Result<Self, MailboxError> {
        let token = Self::load(path)?;
        if !token.is_expired(Utc::now()) {
            return Ok(token);
        }
        if token.refresh_token.is_none() {
            // A known past expiry with no way to renew is dead; an unknown
            // expiry is left for the API to judge.
            return match token.expiry.as_deref().and_then(parse_expiry) {
                Some(_) => Err(MailboxError::AuthExpired),
                None => Ok(token),
            };
        }

        info!("Mailbox token expired, refreshing");
        let refreshed = token.refresh(http).await?;
        refreshed.save(path)?;
        Ok(refreshed)
    }
}

/// google-auth writes naive UTC (`2026-02-08T12:00:00.000000Z` or without Z).
fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
