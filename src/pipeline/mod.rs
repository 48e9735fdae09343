//! Digest pipeline.
//!
//! Every candidate newsletter flows through:
//! 1. `Mailbox::fetch()`: headers and raw body tree
//! 2. `normalize()`: one plain-text body
//! 3. `ArticleExtractor::extract()`: ranked articles, fail-soft
//! 4. `ContentSink::write_article()`: one record per article
//! 5. `Mailbox::set_marker()`: out of the queue
//!
//! Processed newsletters are collected and written as one daily summary.

pub mod orchestrator;
pub mod reset;
pub mod types;

pub use orchestrator::{Orchestrator, RunReport, RunState};
pub use reset::{ResetReport, reset_markers};
