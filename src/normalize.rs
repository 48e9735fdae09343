//! Content normalizer: one plain-text body out of a MIME part tree.
//!
//! Plain text always wins: every `text/plain` leaf is concatenated in
//! document order, and the first `text/html` leaf is only used (with its
//! markup stripped) when no plain text exists anywhere in the tree.
//! Undecodable payloads contribute nothing; they never fail the message.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use scraper::{ElementRef, Html, Node};
use tracing::debug;

use crate::mailbox::{Message, MessagePart, RawMessage};

/// Gmail emits URL-safe base64, with or without padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Elements whose boundaries become line breaks.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

/// Elements whose text is never content.
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "title", "noscript", "template"];

/// Normalize a fetched message into its plain-text form.
pub fn normalize(raw: RawMessage) -> Message {
    let body = body_text(&raw.payload);
    Message {
        id: raw.id,
        subject: raw.subject,
        sender: raw.sender,
        date: raw.date,
        body,
    }
}

/// Extract the body text of a part tree.
pub fn body_text(root: &MessagePart) -> String {
    let mut plain = String::new();
    let mut html_fallback: Option<String> = None;
    collect(root, &mut plain, &mut html_fallback);

    if !plain.is_empty() {
        return plain;
    }
    html_fallback.unwrap_or_default()
}

fn collect(part: &MessagePart, plain: &mut String, html: &mut Option<String>) {
    if !part.parts.is_empty() {
        for child in &part.parts {
            collect(child, plain, html);
        }
        return;
    }

    match part.essence().as_str() {
        "text/plain" => {
            if let Some(text) = part.data.as_deref().and_then(decode_payload) {
                plain.push_str(&text);
            }
        }
        "text/html" if html.is_none() && plain.is_empty() => {
            if let Some(markup) = part.data.as_deref().and_then(decode_payload) {
                *html = Some(html_to_text(&markup));
            }
        }
        _ => {}
    }
}

/// Decode a URL-safe base64 payload. `None` on malformed input.
pub fn decode_payload(data: &str) -> Option<String> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    match URL_SAFE_LENIENT.decode(cleaned.as_bytes()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            debug!(error = %e, "Dropping undecodable body part");
            None
        }
    }
}

/// Strip markup, turning block boundaries into line breaks.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::with_capacity(html.len() / 2);
    walk(document.root_element(), &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }
    let is_block = BLOCK_ELEMENTS.contains(&name);
    if is_block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            walk(child_element, out);
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
    if is_block {
        out.push('\n');
    }
}
