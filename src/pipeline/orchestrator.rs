//! One end-to-end digest run.
//!
//! `Idle → Listing → PerMessageLoop → Summarizing → Done`
//!
//! Each candidate is processed independently by [`Orchestrator::process_message`],
//! which returns a [`MessageOutcome`] or a [`PipelineError`]. The loop logs
//! failures with the message id and moves on; an unmarked message is simply
//! picked up again by the next run.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::DigestConfig;
use crate::error::PipelineError;
use crate::extract::{ArticleExtractor, ExtractorConfig};
use crate::llm::create_provider;
use crate::mailbox::{GmailGateway, Mailbox};
use crate::normalize::normalize;
use crate::pipeline::types::{MessageOutcome, ProcessedNewsletter, SkipReason};
use crate::sink::{ContentSink, NotionSink, SummaryOutcome};

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Listing,
    PerMessageLoop,
    Summarizing,
    Done,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub state: RunState,
    pub candidates: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Processed messages whose marker could not be set.
    pub unmarked: usize,
    pub articles_written: usize,
    pub articles_unwritten: usize,
    /// `None` when no summary was attempted.
    pub summary: Option<SummaryOutcome>,
    /// Listing itself failed; nothing else was attempted.
    pub listing_failed: bool,
}

impl RunReport {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            candidates: 0,
            processed: 0,
            skipped: 0,
            failed: 0,
            unmarked: 0,
            articles_written: 0,
            articles_unwritten: 0,
            summary: None,
            listing_failed: false,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Run state");
        self.state = next;
    }
}

pub struct Orchestrator {
    mailbox: Arc<dyn Mailbox>,
    extractor: ArticleExtractor,
    sink: Arc<dyn ContentSink>,
    marker: String,
}

impl Orchestrator {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        extractor: ArticleExtractor,
        sink: Arc<dyn ContentSink>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            mailbox,
            extractor,
            sink,
            marker: marker.into(),
        }
    }

    /// Wire Gmail, Gemini and Notion from configuration.
    ///
    /// Loads (and if needed refreshes) the cached mailbox token; any failure
    /// here is fatal for the run.
    pub async fn connect(config: DigestConfig) -> crate::error::Result<Self> {
        let DigestConfig {
            gmail,
            notion,
            oracle,
        } = config;

        let marker = gmail.processed_label.clone();
        let mailbox = GmailGateway::connect(gmail).await?;
        let llm = create_provider(&oracle)?;
        let extractor = ArticleExtractor::new(llm, ExtractorConfig::from(&oracle));

        Ok(Self::new(
            Arc::new(mailbox),
            extractor,
            Arc::new(NotionSink::new(notion)),
            marker,
        ))
    }

    /// Run the whole pipeline once.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new();

        report.advance(RunState::Listing);
        info!("Searching for newsletters");
        let candidates = match self.mailbox.list_unprocessed().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %PipelineError::Listing(e), "Could not list candidates");
                report.listing_failed = true;
                report.advance(RunState::Done);
                return report;
            }
        };
        report.candidates = candidates.len();

        if candidates.is_empty() {
            info!("No new newsletters found");
            report.advance(RunState::Done);
            return report;
        }
        info!(count = candidates.len(), "Found newsletters to process");

        report.advance(RunState::PerMessageLoop);
        let mut digest: Vec<ProcessedNewsletter> = Vec::new();

        for id in &candidates {
            match self.process_message(id).await {
                Ok(MessageOutcome::Processed { newsletter, marked }) => {
                    let written = newsletter.articles.iter().filter(|a| a.is_persisted()).count();
                    report.articles_written += written;
                    report.articles_unwritten += newsletter.article_count() - written;
                    report.processed += 1;
                    if !marked {
                        report.unmarked += 1;
                    }
                    digest.push(newsletter);
                }
                Ok(MessageOutcome::Skipped(reason)) => {
                    info!(message_id = %id, reason = reason.label(), "Skipped newsletter");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(message_id = %id, error = %e, "Error processing message");
                    report.failed += 1;
                }
            }
        }

        report.advance(RunState::Summarizing);
        if digest.is_empty() {
            info!("No newsletters were successfully processed, skipping daily summary");
        } else {
            info!(newsletters = digest.len(), "Creating daily summary page");
            report.summary = Some(self.sink.write_daily_summary(&digest).await);
        }

        report.advance(RunState::Done);
        report
    }

    /// Fetch, normalize, extract, persist and mark one message.
    pub async fn process_message(&self, id: &str) -> Result<MessageOutcome, PipelineError> {
        let raw = self
            .mailbox
            .fetch(id)
            .await
            .map_err(|source| PipelineError::Fetch {
                id: id.to_string(),
                source,
            })?;
        let message = normalize(raw);
        info!(message_id = %id, subject = %message.subject, "Processing newsletter");

        if message.body.trim().is_empty() {
            return Ok(MessageOutcome::Skipped(SkipReason::EmptyBody));
        }

        let source_name = message.sender_name();
        let articles = self
            .extractor
            .extract(&message.subject, &message.body, &source_name)
            .await;
        if articles.is_empty() {
            return Ok(MessageOutcome::Skipped(SkipReason::NoArticles));
        }
        info!(message_id = %id, count = articles.len(), "Extracted articles");

        let mut persisted = Vec::with_capacity(articles.len());
        for article in articles {
            match self.sink.write_article(&article).await {
                Some(record_id) => persisted.push(article.with_record_id(record_id)),
                None => {
                    warn!(message_id = %id, title = %article.title, "Article not persisted");
                    persisted.push(article);
                }
            }
        }

        let newsletter = ProcessedNewsletter {
            name: source_name,
            subject: message.subject,
            articles: persisted,
        };

        let marked = match self.mailbox.set_marker(id, &self.marker).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    message_id = %id,
                    error = %e,
                    "Failed to set processing marker, message stays eligible"
                );
                false
            }
        };

        Ok(MessageOutcome::Processed { newsletter, marked })
    }
}
