//! Remove the processing marker from recent newsletters so the next run
//! picks them up again.

use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info, warn};

use newsletter_digest::config::GmailConfig;
use newsletter_digest::logging;
use newsletter_digest::mailbox::GmailGateway;
use newsletter_digest::pipeline::reset_markers;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();

    let (mailbox, marker) = match init().await {
        Ok(parts) => parts,
        Err(e) => {
            error!("Initialization failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match reset_markers(&mailbox, &marker).await {
        Ok(report) if report.marker_missing => {
            warn!(
                marker = %marker,
                available = ?report.available_labels,
                "Label not found, nothing reset"
            );
        }
        Ok(report) => {
            info!(
                found = report.found,
                cleared = report.cleared,
                untouched = report.untouched,
                failed = report.failed,
                "Reset finished"
            );
        }
        Err(e) => error!(error = %e, "Could not look up labels or processed messages"),
    }

    ExitCode::SUCCESS
}

async fn init() -> anyhow::Result<(GmailGateway, String)> {
    let config = GmailConfig::from_env().context("loading configuration")?;
    let marker = config.processed_label.clone();
    let mailbox = GmailGateway::connect(config)
        .await
        .context("connecting to Gmail")?;
    Ok((mailbox, marker))
}
