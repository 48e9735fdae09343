//! Content sink: article records and the daily digest page.

pub mod blocks;
pub mod notion;
pub mod render;

pub use notion::NotionSink;

use async_trait::async_trait;

use crate::pipeline::types::{Article, ProcessedNewsletter};

/// How far a digest write got.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryOutcome {
    /// Set once the page exists.
    pub page_id: Option<String>,
    pub chunks_total: usize,
    /// Includes the chunk sent with the create call.
    pub chunks_written: usize,
}

impl SummaryOutcome {
    pub fn is_complete(&self) -> bool {
        self.page_id.is_some() && self.chunks_written == self.chunks_total
    }
}

/// Destination for extracted articles.
///
/// Both writes absorb their own failures; callers only see what landed.
#[async_trait]
pub trait ContentSink: Send + Sync {
    /// Persist one article. `None` means it was not written.
    async fn write_article(&self, article: &Article) -> Option<String>;

    /// Create the digest page and append its body in chunks.
    async fn write_daily_summary(&self, newsletters: &[ProcessedNewsletter]) -> SummaryOutcome;
}
