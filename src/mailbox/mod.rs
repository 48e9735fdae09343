//! Mailbox gateway: the inbox as an idempotent work queue.
//!
//! A message is a candidate while it carries the newsletter label, lacks
//! the processing marker and arrived inside the recent window. Setting the
//! marker removes it from the queue; clearing it puts it back.

pub mod gmail;
pub mod token;

pub use gmail::GmailGateway;

use async_trait::async_trait;

use crate::error::MailboxError;

/// One node of a message body tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePart {
    /// e.g. `text/plain`, `text/html`, `multipart/alternative`.
    pub mime_type: String,
    /// URL-safe base64 payload, if this part carries one.
    pub data: Option<String>,
    /// Sub-parts for container types, in document order.
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    pub fn leaf(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: Some(data.into()),
            parts: Vec::new(),
        }
    }

    pub fn container(mime_type: impl Into<String>, parts: Vec<MessagePart>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: None,
            parts,
        }
    }

    /// Media type without parameters, lowercased.
    pub fn essence(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

/// A message as fetched: headers plus the raw body tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub payload: MessagePart,
}

/// A message after body normalization. Read-only snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub body: String,
}

impl Message {
    /// Display name of the sender: `"Ben's Bites" <x@y>` → `Ben's Bites`.
    pub fn sender_name(&self) -> String {
        sender_display_name(&self.sender)
    }
}

/// Extract a display name from a `From` header value.
pub fn sender_display_name(from: &str) -> String {
    let name = from
        .split('<')
        .next()
        .unwrap_or_default()
        .trim()
        .replace('"', "");
    if !name.is_empty() {
        return name;
    }
    from.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// Operations the pipeline needs from the mailbox service.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Candidate message ids: newsletter label, no marker, inside the window.
    async fn list_unprocessed(&self) -> Result<Vec<String>, MailboxError>;

    /// Newsletter messages inside the window that do carry the marker.
    async fn list_processed(&self) -> Result<Vec<String>, MailboxError>;

    /// Full headers and body. `NotFound` if the id vanished.
    async fn fetch(&self, message_id: &str) -> Result<RawMessage, MailboxError>;

    /// Attach the marker, creating the label if needed. Idempotent.
    async fn set_marker(&self, message_id: &str, marker: &str) -> Result<(), MailboxError>;

    /// Names of every label in the mailbox.
    async fn label_names(&self) -> Result<Vec<String>, MailboxError>;

    /// Detach the marker. Returns the number of messages affected, which is
    /// zero when the marker label does not exist.
    async fn clear_marker(&self, message_id: &str, marker: &str) -> Result<usize, MailboxError>;
}
