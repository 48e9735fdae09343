use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info, warn};

use newsletter_digest::config::DigestConfig;
use newsletter_digest::error::Error;
use newsletter_digest::logging;
use newsletter_digest::pipeline::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();

    info!("Starting newsletter digest v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = match init().await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Initialization failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let report = orchestrator.run().await;
    info!(
        candidates = report.candidates,
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        unmarked = report.unmarked,
        articles_written = report.articles_written,
        articles_unwritten = report.articles_unwritten,
        "Run finished"
    );
    if let Some(summary) = report.summary {
        if summary.is_complete() {
            info!(page_id = ?summary.page_id, chunks = summary.chunks_total, "Daily summary written");
        } else {
            warn!(
                page_id = ?summary.page_id,
                written = summary.chunks_written,
                total = summary.chunks_total,
                "Daily summary incomplete"
            );
        }
    }

    ExitCode::SUCCESS
}

/// Everything that must succeed before any message is touched.
async fn init() -> anyhow::Result<Orchestrator> {
    let config = DigestConfig::from_env().context("loading configuration")?;
    match Orchestrator::connect(config).await {
        Ok(orchestrator) => Ok(orchestrator),
        Err(Error::Mailbox(e)) if e.is_fatal_init() => {
            Err(anyhow::Error::new(e).context("Gmail token unusable, re-run the consent flow"))
        }
        Err(e) => Err(anyhow::Error::new(e).context("connecting services")),
    }
}
