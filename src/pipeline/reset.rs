//! Marker reset: put processed newsletters back in the queue.

use tracing::{error, info, warn};

use crate::error::MailboxError;
use crate::mailbox::Mailbox;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Messages carrying both the newsletter label and the marker.
    pub found: usize,
    pub cleared: usize,
    /// Listed messages that no longer carried the marker.
    pub untouched: usize,
    pub failed: usize,
    /// The marker label does not exist in the mailbox.
    pub marker_missing: bool,
    /// Every label name, filled only when the marker is missing.
    pub available_labels: Vec<String>,
}

/// Clear `marker` from every processed newsletter inside the window.
///
/// Only listing failures are returned; per-message failures are counted.
pub async fn reset_markers(mailbox: &dyn Mailbox, marker: &str) -> Result<ResetReport, MailboxError> {
    let labels = mailbox.label_names().await?;
    if !labels.iter().any(|name| name.eq_ignore_ascii_case(marker)) {
        warn!(marker, available = ?labels, "Label not found, nothing to reset");
        return Ok(ResetReport {
            marker_missing: true,
            available_labels: labels,
            ..Default::default()
        });
    }

    let ids = mailbox.list_processed().await?;
    let mut report = ResetReport {
        found: ids.len(),
        ..Default::default()
    };
    info!(count = ids.len(), "Found messages to reset");

    for id in &ids {
        match mailbox.clear_marker(id, marker).await {
            Ok(0) => {
                warn!(message_id = %id, "Marker already gone");
                report.untouched += 1;
            }
            Ok(n) => {
                info!(message_id = %id, "Removed label");
                report.cleared += n;
            }
            Err(e) => {
                error!(message_id = %id, error = %e, "Error resetting message");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::mailbox::RawMessage;

    const MARKER: &str = "Agent/newsletter processed";

    /// Processed listing is empty whenever the marker label is absent, as a
    /// label search for a nonexistent label matches nothing.
    #[derive(Default)]
    struct Marked {
        ids: Vec<String>,
        label_exists: bool,
        broken: HashSet<String>,
        bare: HashSet<String>,
        cleared: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailbox for Marked {
        async fn list_unprocessed(&self) -> Result<Vec<String>, MailboxError> {
            Ok(Vec::new())
        }

        async fn list_processed(&self) -> Result<Vec<String>, MailboxError> {
            if !self.label_exists {
                return Ok(Vec::new());
            }
            Ok(self.ids.clone())
        }

        async fn label_names(&self) -> Result<Vec<String>, MailboxError> {
            let mut names = vec!["INBOX".to_string(), "newsletter".to_string()];
            if self.label_exists {
                names.push(MARKER.to_lowercase());
            }
            Ok(names)
        }

        async fn fetch(&self, message_id: &str) -> Result<RawMessage, MailboxError> {
            Err(MailboxError::NotFound {
                entity: "message".into(),
                id: message_id.into(),
            })
        }

        async fn set_marker(&self, _: &str, _: &str) -> Result<(), MailboxError> {
            Ok(())
        }

        async fn clear_marker(&self, message_id: &str, marker: &str) -> Result<usize, MailboxError> {
            assert_eq!(marker, MARKER);
            if !self.label_exists || self.bare.contains(message_id) {
                return Ok(0);
            }
            if self.broken.contains(message_id) {
                return Err(MailboxError::Api {
                    status: 500,
                    message: "backend error".into(),
                });
            }
            self.cleared.lock().unwrap().push(message_id.to_string());
            Ok(1)
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn clears_every_processed_message() {
        let mailbox = Marked {
            ids: ids(&["a", "b", "c"]),
            label_exists: true,
            ..Default::default()
        };
        let report = reset_markers(&mailbox, MARKER).await.unwrap();
        assert_eq!(
            report,
            ResetReport {
                found: 3,
                cleared: 3,
                ..Default::default()
            }
        );
        assert_eq!(*mailbox.cleared.lock().unwrap(), ids(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn failures_are_counted_not_fatal() {
        let mailbox = Marked {
            ids: ids(&["a", "b", "c"]),
            label_exists: true,
            broken: HashSet::from(["b".to_string()]),
            ..Default::default()
        };
        let report = reset_markers(&mailbox, MARKER).await.unwrap();
        assert_eq!(report.cleared, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn missing_label_is_reported_with_available_names() {
        let mailbox = Marked {
            ids: ids(&["a", "b"]),
            label_exists: false,
            ..Default::default()
        };
        let report = reset_markers(&mailbox, MARKER).await.unwrap();
        assert!(report.marker_missing);
        assert_eq!(report.found, 0);
        assert_eq!(report.cleared, 0);
        assert_eq!(report.available_labels, ids(&["INBOX", "newsletter"]));
        assert!(mailbox.cleared.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_without_marker_does_not_stop_the_loop() {
        let mailbox = Marked {
            ids: ids(&["a", "b", "c"]),
            label_exists: true,
            bare: HashSet::from(["a".to_string()]),
            ..Default::default()
        };
        let report = reset_markers(&mailbox, MARKER).await.unwrap();
        assert!(!report.marker_missing);
        assert_eq!(report.found, 3);
        assert_eq!(report.untouched, 1);
        assert_eq!(report.cleared, 2);
        assert_eq!(*mailbox.cleared.lock().unwrap(), ids(&["b", "c"]));
    }

    #[tokio::test]
    async fn nothing_to_reset() {
        let mailbox = Marked {
            label_exists: true,
            ..Default::default()
        };
        let report = reset_markers(&mailbox, MARKER).await.unwrap();
        assert_eq!(report, ResetReport::default());
    }
}
