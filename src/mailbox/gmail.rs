//! Gmail API v1 implementation of [`Mailbox`].
//!
//! Listing uses the search syntax (`label:… -label:… newer_than:Nd`),
//! the marker is an ordinary user label applied through `messages.modify`.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::token::OAuthToken;
use super::{Mailbox, MessagePart, RawMessage};
use crate::config::GmailConfig;
use crate::error::MailboxError;

/// Upper bound on `nextPageToken` hops per listing.
const MAX_LIST_PAGES: usize = 10;

// ── API wire types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<Payload>,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Clone, Deserialize)]
struct Label {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest<'a> {
    name: &'a str,
    label_list_visibility: &'a str,
    message_list_visibility: &'a str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_label_ids: Vec<String>,
}

impl From<Payload> for MessagePart {
    fn from(payload: Payload) -> Self {
        Self {
            mime_type: payload.mime_type,
            data: payload.body.and_then(|b| b.data).filter(|d| !d.is_empty()),
            parts: payload.parts.into_iter().map(MessagePart::from).collect(),
        }
    }
}

// ── Query construction ──────────────────────────────────────────────

/// A `label:` operand, quoted when the name needs it.
fn label_term(name: &str) -> String {
    if name.chars().any(|c| c.is_whitespace() || "()\"{}".contains(c)) {
        format!("label:\"{}\"", name.replace('"', ""))
    } else {
        format!("label:{name}")
    }
}

/// Newsletter label AND NOT marker AND within the window.
pub fn unprocessed_query(newsletter_label: &str, marker: &str, window_days: u32) -> String {
    format!(
        "{} -{} newer_than:{}d",
        label_term(newsletter_label),
        label_term(marker),
        window_days
    )
}

/// Newsletter label AND marker AND within the window.
pub fn processed_query(newsletter_label: &str, marker: &str, window_days: u32) -> String {
    format!(
        "{} {} newer_than:{}d",
        label_term(newsletter_label),
        label_term(marker),
        window_days
    )
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Gmail-backed mailbox gateway.
pub struct GmailGateway {
    http: reqwest::Client,
    access_token: SecretString,
    config: GmailConfig,
    /// Label name → id, filled lazily.
    label_ids: Mutex<HashMap<String, String>>,
}

impl GmailGateway {
    /// Build a gateway with an already-valid access token.
    pub fn new(config: GmailConfig, access_token: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
            config,
            label_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Load the cached token (refreshing it if needed) and build a gateway.
    ///
    /// Fails with `TokenNotFound` when the cache is absent; the pipeline
    /// never runs the consent flow itself.
    pub async fn connect(config: GmailConfig) -> Result<Self, MailboxError> {
        let http = reqwest::Client::new();
        let token = OAuthToken::load_fresh(&config.token_path, &http).await?;
        Ok(Self {
            http,
            access_token: SecretString::from(token.token),
            config,
            label_ids: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/gmail/v1/users/me/{}",
            self.config.api_base.trim_end_matches('/'),
            path
        )
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, MailboxError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let mut params: Vec<(&str, String)> = vec![("q", query.to_string())];
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let resp = self
                .http
                .get(self.url("messages"))
                .bearer_auth(self.access_token.expose_secret())
                .query(&params)
                .send()
                .await?;
            let list: MessageListResponse = check(resp).await?.json().await?;

            ids.extend(list.messages.into_iter().map(|m| m.id));
            match list.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => return Ok(ids),
            }
        }

        warn!(
            query,
            pages = MAX_LIST_PAGES,
            "Message listing truncated at page limit"
        );
        Ok(ids)
    }

    async fn list_labels(&self) -> Result<Vec<Label>, MailboxError> {
        let resp = self
            .http
            .get(self.url("labels"))
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;
        let list: LabelList = check(resp).await?.json().await?;
        Ok(list.labels)
    }

    /// Resolve a label id by name. `exact` controls case sensitivity.
    async fn find_label(&self, name: &str, exact: bool) -> Result<Option<String>, MailboxError> {
        if let Some(id) = self.label_ids.lock().await.get(name) {
            return Ok(Some(id.clone()));
        }

        let found = self
            .list_labels()
            .await?
            .into_iter()
            .find(|l| {
                if exact {
                    l.name == name
                } else {
                    l.name.eq_ignore_ascii_case(name)
                }
            })
            .map(|l| l.id);

        if let Some(ref id) = found {
            self.label_ids
                .lock()
                .await
                .insert(name.to_string(), id.clone());
        }
        Ok(found)
    }

    /// Resolve the marker label, creating it if it does not exist yet.
    async fn ensure_label(&self, name: &str) -> Result<String, MailboxError> {
        if let Some(id) = self.find_label(name, true).await? {
            return Ok(id);
        }

        let resp = self
            .http
            .post(self.url("labels"))
            .bearer_auth(self.access_token.expose_secret())
            .json(&CreateLabelRequest {
                name,
                label_list_visibility: "labelShow",
                message_list_visibility: "show",
            })
            .send()
            .await?;

        match check(resp).await {
            Ok(resp) => {
                let label: Label = resp.json().await?;
                info!(label = %label.name, id = %label.id, "Created mailbox label");
                self.label_ids
                    .lock()
                    .await
                    .insert(name.to_string(), label.id.clone());
                Ok(label.id)
            }
            Err(MailboxError::Api { status: 409, .. }) => {
                // Created concurrently, or exists with different casing.
                debug!(label = name, "Label already exists, re-resolving");
                self.find_label(name, false)
                    .await?
                    .ok_or_else(|| MailboxError::NotFound {
                        entity: "Label".into(),
                        id: name.to_string(),
                    })
            }
            Err(e) => Err(e),
        }
    }

    async fn modify(&self, message_id: &str, request: &ModifyRequest) -> Result<(), MailboxError> {
        let resp = self
            .http
            .post(self.url(&format!("messages/{message_id}/modify")))
            .bearer_auth(self.access_token.expose_secret())
            .json(request)
            .send()
            .await?;
        not_found_as(check(resp).await, "Message", message_id)?;
        Ok(())
    }
}

#[async_trait]
impl Mailbox for GmailGateway {
    async fn list_unprocessed(&self) -> Result<Vec<String>, MailboxError> {
        let query = unprocessed_query(
            &self.config.newsletter_label,
            &self.config.processed_label,
            self.config.window_days,
        );
        debug!(query = %query, "Listing unprocessed newsletters");
        self.search(&query).await
    }

    async fn list_processed(&self) -> Result<Vec<String>, MailboxError> {
        let query = processed_query(
            &self.config.newsletter_label,
            &self.config.processed_label,
            self.config.window_days,
        );
        debug!(query = %query, "Listing processed newsletters");
        self.search(&query).await
    }

    async fn label_names(&self) -> Result<Vec<String>, MailboxError> {
        Ok(self.list_labels().await?.into_iter().map(|l| l.name).collect())
    }

    async fn fetch(&self, message_id: &str) -> Result<RawMessage, MailboxError> {
        let resp = self
            .http
            .get(self.url(&format!("messages/{message_id}")))
            .bearer_auth(self.access_token.expose_secret())
            .query(&[("format", "full")])
            .send()
            .await?;
        let resp = not_found_as(check(resp).await, "Message", message_id)?;
        let detail: MessageDetail = resp.json().await?;

        let payload = detail.payload.unwrap_or_default();
        let header = |name: &str| {
            payload
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };
        let subject = header("Subject").unwrap_or_else(|| "No Subject".to_string());
        let sender = header("From").unwrap_or_else(|| "Unknown Sender".to_string());
        let date = header("Date").unwrap_or_default();

        let id = if detail.id.is_empty() {
            message_id.to_string()
        } else {
            detail.id
        };

        Ok(RawMessage {
            id,
            subject,
            sender,
            date,
            payload: MessagePart::from(payload),
        })
    }

    async fn set_marker(&self, message_id: &str, marker: &str) -> Result<(), MailboxError> {
        let label_id = self.ensure_label(marker).await?;
        self.modify(
            message_id,
            &ModifyRequest {
                add_label_ids: vec![label_id],
                ..Default::default()
            },
        )
        .await?;
        info!(message_id, marker, "Applied processing marker");
        Ok(())
    }

    async fn clear_marker(&self, message_id: &str, marker: &str) -> Result<usize, MailboxError> {
        let Some(label_id) = self.find_label(marker, false).await? else {
            return Ok(0);
        };
        self.modify(
            message_id,
            &ModifyRequest {
                remove_label_ids: vec![label_id],
                ..Default::default()
            },
        )
        .await?;
        info!(message_id, marker, "Removed processing marker");
        Ok(1)
    }
}

/// Map non-success statuses to typed errors.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, MailboxError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(MailboxError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MailboxError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

fn not_found_as(
    result: Result<reqwest::Response, MailboxError>,
    entity: &str,
    id: &str,
) -> Result<reqwest::Response, MailboxError> {
    match result {
        Err(MailboxError::Api { status: 404, .. }) => Err(MailboxError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MARKER: &str = "Agent/newsletter processed";

    fn gateway(server: &MockServer) -> GmailGateway {
        let config = GmailConfig {
            token_path: PathBuf::from("unused.json"),
            api_base: server.uri(),
            newsletter_label: "newsletter".into(),
            processed_label: MARKER.into(),
            window_days: 2,
        };
        GmailGateway::new(config, SecretString::from("test-token"))
    }

    async fn mount_labels(server: &MockServer, labels: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "labels": labels
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn unprocessed_query_excludes_marker() {
        assert_eq!(
            unprocessed_query("newsletter", MARKER, 2),
            "label:newsletter -label:\"Agent/newsletter processed\" newer_than:2d"
        );
    }

    #[test]
    fn processed_query_requires_both_labels() {
        assert_eq!(
            processed_query("newsletter", MARKER, 3),
            "label:newsletter label:\"Agent/newsletter processed\" newer_than:3d"
        );
    }

    #[tokio::test]
    async fn list_unprocessed_follows_pages() {
        let server = MockServer::start().await;
        let query = unprocessed_query("newsletter", MARKER, 2);

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", query.as_str()))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m3", "threadId": "t3"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", query.as_str()))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t2"}],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let ids = gateway(&server).list_unprocessed().await.unwrap();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn empty_listing_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"resultSizeEstimate": 0})),
            )
            .mount(&server)
            .await;

        let ids = gateway(&server).list_unprocessed().await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn fetch_maps_headers_and_parts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/m1"))
            .and(query_param("format", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m1",
                "payload": {
                    "mimeType": "multipart/alternative",
                    "headers": [
                        {"name": "subject", "value": "Weekly AI Roundup"},
                        {"name": "From", "value": "\"AI Weekly\" <hi@aiweekly.co>"},
                        {"name": "Date", "value": "Mon, 19 Oct 2026 07:00:00 +0000"}
                    ],
                    "body": {"size": 0},
                    "parts": [
                        {"mimeType": "text/plain", "body": {"data": "SGk", "size": 2}},
                        {"mimeType": "text/html", "body": {"data": "PHA-SGk8L3A-", "size": 10}}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let msg = gateway(&server).fetch("m1").await.unwrap();
        assert_eq!(msg.subject, "Weekly AI Roundup");
        assert_eq!(msg.sender, "\"AI Weekly\" <hi@aiweekly.co>");
        assert_eq!(msg.date, "Mon, 19 Oct 2026 07:00:00 +0000");
        assert_eq!(msg.payload.parts.len(), 2);
        assert_eq!(msg.payload.parts[0].data.as_deref(), Some("SGk"));
        assert_eq!(msg.payload.data, None);
    }

    #[tokio::test]
    async fn fetch_missing_message_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Requested entity was not found."))
            .mount(&server)
            .await;

        let err = gateway(&server).fetch("gone").await.unwrap_err();
        assert!(matches!(err, MailboxError::NotFound { ref id, .. } if id == "gone"));
    }

    #[tokio::test]
    async fn fetch_defaults_missing_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/bare"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "bare",
                "payload": {"mimeType": "text/plain", "body": {"data": "SGk"}}
            })))
            .mount(&server)
            .await;

        let msg = gateway(&server).fetch("bare").await.unwrap();
        assert_eq!(msg.subject, "No Subject");
        assert_eq!(msg.sender, "Unknown Sender");
        assert_eq!(msg.payload.data.as_deref(), Some("SGk"));
    }

    #[tokio::test]
    async fn set_marker_uses_existing_label() {
        let server = MockServer::start().await;
        mount_labels(
            &server,
            serde_json::json!([{"id": "INBOX", "name": "INBOX"}, {"id": "Label_7", "name": MARKER}]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_json(serde_json::json!({"addLabelIds": ["Label_7"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        gateway(&server).set_marker("m1", MARKER).await.unwrap();
    }

    #[tokio::test]
    async fn set_marker_creates_missing_label() {
        let server = MockServer::start().await;
        mount_labels(&server, serde_json::json!([{"id": "INBOX", "name": "INBOX"}])).await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "Label_9", "name": MARKER
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_json(serde_json::json!({"addLabelIds": ["Label_9"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server).set_marker("m1", MARKER).await.unwrap();
    }

    #[tokio::test]
    async fn set_marker_recovers_from_create_conflict() {
        let server = MockServer::start().await;
        // Exists with different casing: exact lookup misses, create conflicts.
        mount_labels(
            &server,
            serde_json::json!([{"id": "Label_3", "name": "agent/Newsletter Processed"}]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(409).set_body_string("Label name exists or conflicts"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_json(serde_json::json!({"addLabelIds": ["Label_3"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server).set_marker("m1", MARKER).await.unwrap();
    }

    #[tokio::test]
    async fn label_id_is_cached_across_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "labels": [{"id": "Label_7", "name": MARKER}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m2/modify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m2"})))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        gw.set_marker("m1", MARKER).await.unwrap();
        gw.set_marker("m2", MARKER).await.unwrap();
    }

    #[tokio::test]
    async fn clear_marker_removes_label() {
        let server = MockServer::start().await;
        mount_labels(
            &server,
            serde_json::json!([{"id": "Label_7", "name": "agent/newsletter processed"}]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_json(serde_json::json!({"removeLabelIds": ["Label_7"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        let affected = gateway(&server).clear_marker("m1", MARKER).await.unwrap();
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn clear_marker_without_label_affects_nothing() {
        let server = MockServer::start().await;
        mount_labels(&server, serde_json::json!([{"id": "INBOX", "name": "INBOX"}])).await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let affected = gateway(&server).clear_marker("m1", MARKER).await.unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn label_names_lists_every_label() {
        let server = MockServer::start().await;
        mount_labels(
            &server,
            serde_json::json!([
                {"id": "INBOX", "name": "INBOX"},
                {"id": "Label_3", "name": "newsletter"}
            ]),
        )
        .await;

        let names = gateway(&server).label_names().await.unwrap();
        assert_eq!(names, vec!["INBOX".to_string(), "newsletter".to_string()]);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = gateway(&server).list_unprocessed().await.unwrap_err();
        assert!(matches!(err, MailboxError::AuthExpired));
    }
}
