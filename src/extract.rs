//! Extraction oracle client.
//!
//! One completion request per newsletter. The reply is expected to hold a
//! JSON array of article objects; anything else degrades to zero articles.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::OracleConfig;
use crate::error::ExtractionError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{
    Article, MAX_ARTICLES_PER_MESSAGE, is_must_read, normalize_category,
};

/// Max tokens for an extraction reply.
const EXTRACTION_MAX_TOKENS: u32 = 4096;

/// Low temperature keeps the JSON shape stable.
const EXTRACTION_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Body is cut to this many characters before submission.
    pub max_body_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&OracleConfig> for ExtractorConfig {
    fn from(config: &OracleConfig) -> Self {
        Self {
            max_body_chars: config.max_body_chars,
            temperature: EXTRACTION_TEMPERATURE,
            max_tokens: EXTRACTION_MAX_TOKENS,
        }
    }
}

/// Turns a newsletter body into ranked, enriched articles.
pub struct ArticleExtractor {
    llm: Arc<dyn LlmProvider>,
    config: ExtractorConfig,
}

impl ArticleExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ExtractorConfig) -> Self {
        Self { llm, config }
    }

    /// Extract up to five articles, ordered by rank.
    ///
    /// Never fails: transport errors and malformed replies are logged and
    /// yield an empty sequence.
    pub async fn extract(&self, subject: &str, body: &str, source_name: &str) -> Vec<Article> {
        let body = truncate_chars(body, self.config.max_body_chars);

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extraction_system_prompt()),
            ChatMessage::user(build_extraction_user_prompt(subject, source_name, body)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(subject, error = %e, "Extraction request failed");
                return Vec::new();
            }
        };

        debug!(
            subject,
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Extraction reply received"
        );

        let parsed = match parse_articles(&response.content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    subject,
                    raw_response = %response.content,
                    error = %e,
                    "Failed to parse extraction reply, treating as no articles"
                );
                return Vec::new();
            }
        };

        let articles = repair(parsed, source_name, subject);
        info!(subject, count = articles.len(), "Extracted articles");
        articles
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_extraction_system_prompt() -> String {
    "You are a newsletter analyst. From the newsletter you are given, pick the most valuable \
     articles and summarize each one.\n\n\
     Respond with ONLY a JSON array (no prose), best article first:\n\
     [{\"rank\": 1, \"title\": \"...\", \"url\": \"...\", \"summary\": \"...\", \
     \"takeaways\": [\"...\"], \"category\": \"...\", \"must_read\": true}]\n\n\
     Rules:\n\
     - At most 5 articles; return [] if the newsletter has no real articles\n\
     - rank is 1..5, unique, 1 = most valuable\n\
     - must_read is true only for ranks 1 and 2\n\
     - url is the article's own link from the newsletter; omit it if there is none\n\
     - summary is 2-3 sentences\n\
     - takeaways has 3-5 short items\n\
     - category is one short label, e.g. \"AI/ML\", \"Security\", \"Product\""
        .to_string()
}

fn build_extraction_user_prompt(subject: &str, source_name: &str, body: &str) -> String {
    let mut prompt = String::with_capacity(body.len() + 128);
    prompt.push_str(&format!("Newsletter: {}\n", source_name));
    prompt.push_str(&format!("Subject: {}\n\n", subject));
    prompt.push_str(body);
    prompt
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

// ── Reply parsing ───────────────────────────────────────────────────

/// One article as the oracle returns it. Every field is optional here;
/// [`repair`] decides what survives.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OracleArticle {
    #[serde(default)]
    pub rank: Option<serde_json::Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub takeaways: Option<Vec<String>>,
    #[serde(default)]
    pub category: Option<String>,
}

impl OracleArticle {
    fn rank_hint(&self) -> Option<i64> {
        match self.rank.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Parse a raw reply into oracle articles.
///
/// Accepts a bare array, a fenced block, or an array embedded in prose.
/// Array elements that are not article objects are dropped individually.
pub fn parse_articles(raw: &str) -> Result<Vec<OracleArticle>, ExtractionError> {
    let json = extract_json_array(raw);
    let items: Vec<serde_json::Value> =
        serde_json::from_str(&json).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    let articles = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<OracleArticle>(item) {
            Ok(article) => Some(article),
            Err(e) => {
                debug!(error = %e, "Dropping non-article array element");
                None
            }
        })
        .collect();
    Ok(articles)
}

/// Pull the JSON array out of a reply that may be fenced or wrapped in prose.
fn extract_json_array(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('[') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('[') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Validate, rank and enrich parsed articles.
///
/// Untitled entries are dropped. Survivors are stable-sorted by the
/// oracle's rank (missing ranks last), capped, renumbered from 1 and
/// stamped with the newsletter's name and subject.
pub fn repair(parsed: Vec<OracleArticle>, source_name: &str, subject: &str) -> Vec<Article> {
    let mut ranked: Vec<(i64, OracleArticle)> = parsed
        .into_iter()
        .filter(|a| a.title.as_deref().is_some_and(|t| !t.trim().is_empty()))
        .map(|a| (a.rank_hint().unwrap_or(i64::MAX), a))
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);
    ranked.truncate(MAX_ARTICLES_PER_MESSAGE);

    ranked
        .into_iter()
        .zip(1u8..)
        .map(|((_, raw), rank)| Article {
            rank,
            title: raw.title.unwrap_or_default().trim().to_string(),
            url: raw
                .url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            summary: raw.summary.unwrap_or_default().trim().to_string(),
            takeaways: raw
                .takeaways
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            category: normalize_category(raw.category.as_deref().unwrap_or_default()),
            must_read: is_must_read(rank),
            source_name: source_name.to_string(),
            source_subject: subject.to_string(),
            record_id: None,
        })
        .collect()
}
