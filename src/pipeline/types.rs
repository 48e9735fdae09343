//! Shared types for the digest pipeline.

use serde::{Deserialize, Serialize};

/// Ranks up to and including this value are must-read.
pub const MUST_READ_MAX_RANK: u8 = 2;

/// At most this many articles are kept per newsletter.
pub const MAX_ARTICLES_PER_MESSAGE: usize = 5;

/// Category used when the oracle gives none.
pub const UNCATEGORIZED: &str = "Uncategorized";

// ── Article ─────────────────────────────────────────────────────────

/// One ranked article distilled from a newsletter.
///
/// Built complete by the extractor (including source metadata); the only
/// later change is attaching the knowledge-base record id after the write,
/// which produces a new value via [`Article::with_record_id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// 1..=5, unique within one newsletter, 1 is best.
    pub rank: u8,
    pub title: String,
    /// May be absent; the sink substitutes a placeholder.
    pub url: Option<String>,
    pub summary: String,
    pub takeaways: Vec<String>,
    /// Single-valued label; commas already replaced by slashes.
    pub category: String,
    pub must_read: bool,
    /// Newsletter display name (sender name).
    pub source_name: String,
    /// Newsletter subject line.
    pub source_subject: String,
    /// Knowledge-base record id, once persisted.
    pub record_id: Option<String>,
}

impl Article {
    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.record_id.is_some()
    }
}

/// Derived must-read flag.
pub fn is_must_read(rank: u8) -> bool {
    (1..=MUST_READ_MAX_RANK).contains(&rank)
}

/// Normalize an oracle category into a single select value.
pub fn normalize_category(raw: &str) -> String {
    let cleaned = raw.trim().replace(',', "/");
    if cleaned.is_empty() {
        UNCATEGORIZED.to_string()
    } else {
        cleaned
    }
}

// ── Newsletter ──────────────────────────────────────────────────────

/// All articles extracted from one newsletter during this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedNewsletter {
    pub name: String,
    pub subject: String,
    pub articles: Vec<Article>,
}

impl ProcessedNewsletter {
    pub fn article_count(&self) -> usize {
        self.articles.len()
    }
}

/// Total article count across a digest.
pub fn total_articles(newsletters: &[ProcessedNewsletter]) -> usize {
    newsletters.iter().map(ProcessedNewsletter::article_count).sum()
}

// ── Per-message outcome ─────────────────────────────────────────────

/// Why a message was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Extraction yielded nothing (empty reply, bad JSON, oracle down).
    NoArticles,
    /// Body normalized to nothing.
    EmptyBody,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoArticles => "no articles extracted",
            Self::EmptyBody => "empty body",
        }
    }
}

/// Result of processing one candidate message.
#[derive(Debug, Clone)]
pub enum MessageOutcome {
    /// Articles were persisted (individually they may have failed).
    Processed {
        newsletter: ProcessedNewsletter,
        /// Whether the processing marker was applied.
        marked: bool,
    },
    /// Nothing persisted, marker not applied; eligible again next run.
    Skipped(SkipReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(rank: u8) -> Article {
        Article {
            rank,
            title: format!("Article {rank}"),
            url: None,
            summary: String::new(),
            takeaways: vec![],
            category: UNCATEGORIZED.into(),
            must_read: is_must_read(rank),
            source_name: "Ben's Bites".into(),
            source_subject: "Daily".into(),
            record_id: None,
        }
    }

    #[test]
    fn must_read_is_top_two() {
        assert!(is_must_read(1));
        assert!(is_must_read(2));
        assert!(!is_must_read(3));
        assert!(!is_must_read(5));
        assert!(!is_must_read(0));
    }

    #[test]
    fn category_commas_become_slashes() {
        assert_eq!(normalize_category("AI, Product"), "AI/ Product");
        assert_eq!(normalize_category("Engineering"), "Engineering");
    }

    #[test]
    fn empty_category_falls_back() {
        assert_eq!(normalize_category(""), UNCATEGORIZED);
        assert_eq!(normalize_category("   "), UNCATEGORIZED);
    }

    #[test]
    fn with_record_id_marks_persisted() {
        let a = article(1);
        assert!(!a.is_persisted());
        let a = a.with_record_id("abc-123");
        assert!(a.is_persisted());
        assert_eq!(a.record_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn total_articles_sums_newsletters() {
        let digest = vec![
            ProcessedNewsletter {
                name: "A".into(),
                subject: "a".into(),
                articles: vec![article(1), article(2)],
            },
            ProcessedNewsletter {
                name: "B".into(),
                subject: "b".into(),
                articles: vec![article(1)],
            },
        ];
        assert_eq!(total_articles(&digest), 3);
    }
}
