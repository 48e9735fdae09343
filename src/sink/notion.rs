//! Notion REST implementation of [`ContentSink`].

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::blocks::{Block, Properties};
use super::render::{
    MAX_BLOCKS_PER_CALL, article_children, article_properties, chunk_blocks, summary_blocks,
    summary_properties, summary_title,
};
use super::{ContentSink, SummaryOutcome};
use crate::config::NotionConfig;
use crate::error::SinkError;
use crate::pipeline::types::{Article, ProcessedNewsletter};

const NOTION_VERSION: &str = "2022-06-28";

// ── API wire types ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Parent<'a> {
    database_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePageRequest<'a> {
    parent: Parent<'a>,
    properties: &'a Properties,
    children: &'a [Block],
}

#[derive(Debug, Serialize)]
struct AppendChildrenRequest<'a> {
    children: &'a [Block],
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    id: Option<String>,
}

// ── Sink ────────────────────────────────────────────────────────────

pub struct NotionSink {
    http: reqwest::Client,
    config: NotionConfig,
}

impl NotionSink {
    pub fn new(config: NotionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    /// Create a page in `database_id` and return its id.
    pub async fn create_page(
        &self,
        database_id: &str,
        properties: &Properties,
        children: &[Block],
    ) -> Result<String, SinkError> {
        let body = CreatePageRequest {
            parent: Parent { database_id },
            properties,
            children,
        };
        let resp = self
            .http
            .post(self.url("pages"))
            .bearer_auth(self.config.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await?;
        let page: PageResponse = check(resp).await?.json().await?;
        page.id.filter(|id| !id.is_empty()).ok_or(SinkError::MissingPageId)
    }

    /// Append blocks to the end of an existing page.
    pub async fn append_children(&self, page_id: &str, children: &[Block]) -> Result<(), SinkError> {
        let resp = self
            .http
            .patch(self.url(&format!("blocks/{}/children", page_id)))
            .bearer_auth(self.config.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
            .json(&AppendChildrenRequest { children })
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn write_summary_on(
        &self,
        newsletters: &[ProcessedNewsletter],
        day: NaiveDate,
    ) -> SummaryOutcome {
        let title = summary_title(day);
        let properties = summary_properties(newsletters, day);
        let chunks = chunk_blocks(
            summary_blocks(newsletters, &self.config.fallback_url),
            MAX_BLOCKS_PER_CALL,
        );
        let mut outcome = SummaryOutcome {
            page_id: None,
            chunks_total: chunks.len(),
            chunks_written: 0,
        };

        let mut chunks = chunks.into_iter();
        let first = chunks.next().unwrap_or_default();
        let page_id = match self
            .create_page(&self.config.summary_db_id, &properties, &first)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(title = %title, error = %e, "Failed to create daily summary page");
                return outcome;
            }
        };
        info!(title = %title, page_id = %page_id, "Created daily summary page");
        if !first.is_empty() {
            outcome.chunks_written = 1;
        }
        outcome.page_id = Some(page_id.clone());

        let remaining = outcome.chunks_total.saturating_sub(1);
        for (i, chunk) in chunks.enumerate() {
            info!(chunk = i + 1, of = remaining, "Appending summary chunk");
            if let Err(e) = self.append_children(&page_id, &chunk).await {
                warn!(
                    page_id = %page_id,
                    chunk = i + 1,
                    error = %e,
                    "Summary append failed, page left partial"
                );
                break;
            }
            outcome.chunks_written += 1;
        }
        outcome
    }
}

#[async_trait]
impl ContentSink for NotionSink {
    async fn write_article(&self, article: &Article) -> Option<String> {
        let properties = article_properties(article, &self.config.fallback_url, Self::today());
        let mut chunks = chunk_blocks(article_children(article), MAX_BLOCKS_PER_CALL).into_iter();
        let first = chunks.next().unwrap_or_default();
        let id = match self
            .create_page(&self.config.articles_db_id, &properties, &first)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(title = %article.title, error = %e, "Failed to create article record");
                return None;
            }
        };
        info!(title = %article.title, page_id = %id, "Created article record");

        // The record exists; a failed append only loses takeaways.
        for chunk in chunks {
            if let Err(e) = self.append_children(&id, &chunk).await {
                warn!(page_id = %id, error = %e, "Failed to append article takeaways");
                break;
            }
        }
        Some(id)
    }

    async fn write_daily_summary(&self, newsletters: &[ProcessedNewsletter]) -> SummaryOutcome {
        self.write_summary_on(newsletters, Self::today()).await
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SinkError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    use secrecy::SecretString;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE_ID: &str = "11111111-2222-3333-4444-555555555555";

    fn sink(server: &MockServer) -> NotionSink {
        NotionSink::new(NotionConfig {
            api_key: SecretString::from("secret_test"),
            articles_db_id: "articles-db".into(),
            summary_db_id: "summary-db".into(),
            api_base: server.uri(),
            fallback_url: "https://example.com".into(),
        })
    }

    fn article(rank: u8, takeaways: usize) -> Article {
        Article {
            rank,
            title: format!("Article {rank}"),
            url: None,
            summary: "S".into(),
            takeaways: (0..takeaways).map(|i| format!("t{i}")).collect(),
            category: "AI".into(),
            must_read: rank <= 2,
            source_name: "AI Weekly".into(),
            source_subject: "Weekly AI Roundup".into(),
            record_id: Some(format!("rec-{rank}")),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    async fn mount_create(server: &MockServer, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .and(header("Notion-Version", NOTION_VERSION))
            .and(header("Authorization", "Bearer secret_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "page",
                "id": PAGE_ID
            })))
            .expect(expected)
            .mount(server)
            .await;
    }

    fn blocks_of(body: &serde_json::Value) -> Vec<Block> {
        serde_json::from_value(body["children"].clone()).unwrap()
    }

    /// A digest that renders to exactly `n` blocks: one newsletter with
    /// one article carrying `n - 6` takeaways.
    fn digest_of(n: usize) -> Vec<ProcessedNewsletter> {
        vec![ProcessedNewsletter {
            name: "AI Weekly".into(),
            subject: "Weekly AI Roundup".into(),
            articles: vec![article(1, n - 6)],
        }]
    }

    #[tokio::test]
    async fn write_article_creates_page() {
        let server = MockServer::start().await;
        mount_create(&server, 1).await;

        let id = sink(&server).write_article(&article(1, 3)).await;
        assert_eq!(id.as_deref(), Some(PAGE_ID));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["parent"]["database_id"], "articles-db");
        assert_eq!(body["properties"]["Article Link"]["url"], "https://example.com");
        assert_eq!(body["properties"]["Must-Read"]["checkbox"], true);
        assert_eq!(body["properties"]["Rank"]["number"], 1);
        assert_eq!(blocks_of(&body).len(), 4);
    }

    #[tokio::test]
    async fn long_takeaway_list_is_appended_in_chunks() {
        let server = MockServer::start().await;
        mount_create(&server, 1).await;
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/blocks/{}/children", PAGE_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        // Heading plus 150 bullets.
        let id = sink(&server).write_article(&article(1, 150)).await;
        assert_eq!(id.as_deref(), Some(PAGE_ID));

        let requests = server.received_requests().await.unwrap();
        let sizes: Vec<usize> = requests
            .iter()
            .map(|r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
                blocks_of(&body).len()
            })
            .collect();
        assert_eq!(sizes, vec![MAX_BLOCKS_PER_CALL, 51]);
    }

    #[tokio::test]
    async fn write_article_failure_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(400).set_body_string("validation_error"))
            .mount(&server)
            .await;

        assert!(sink(&server).write_article(&article(1, 1)).await.is_none());
    }

    #[tokio::test]
    async fn write_article_without_id_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        assert!(sink(&server).write_article(&article(1, 1)).await.is_none());
    }

    #[tokio::test]
    async fn summary_of_250_blocks_is_one_create_and_two_appends() {
        let server = MockServer::start().await;
        mount_create(&server, 1).await;
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/blocks/{}/children", PAGE_ID)))
            .and(header("Notion-Version", NOTION_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let newsletters = digest_of(250);
        let expected = summary_blocks(&newsletters, "https://example.com");
        assert_eq!(expected.len(), 250);

        let outcome = sink(&server).write_summary_on(&newsletters, day()).await;
        assert_eq!(outcome.page_id.as_deref(), Some(PAGE_ID));
        assert_eq!(outcome.chunks_total, 3);
        assert_eq!(outcome.chunks_written, 3);
        assert!(outcome.is_complete());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        let mut sent = Vec::new();
        for request in &requests {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let blocks = blocks_of(&body);
            assert!(blocks.len() <= MAX_BLOCKS_PER_CALL);
            sent.extend(blocks);
        }
        assert_eq!(sent, expected);

        let create: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(create["parent"]["database_id"], "summary-db");
        assert_eq!(
            create["properties"]["Title"]["title"][0]["text"]["content"],
            "Newsletter Digest - March 07, 2025"
        );
        assert_eq!(create["properties"]["Number of Articles"]["number"], 1);
    }

    #[tokio::test]
    async fn empty_digest_still_creates_page() {
        let server = MockServer::start().await;
        mount_create(&server, 1).await;

        let outcome = sink(&server).write_summary_on(&[], day()).await;
        assert_eq!(outcome.page_id.as_deref(), Some(PAGE_ID));
        assert_eq!(outcome.chunks_total, 0);
        assert!(outcome.is_complete());

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["children"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn failed_append_stops_further_appends() {
        let server = MockServer::start().await;
        mount_create(&server, 1).await;
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/blocks/{}/children", PAGE_ID)))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = sink(&server).write_summary_on(&digest_of(250), day()).await;
        assert_eq!(outcome.page_id.as_deref(), Some(PAGE_ID));
        assert_eq!(outcome.chunks_total, 3);
        assert_eq!(outcome.chunks_written, 1);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn failed_create_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = sink(&server).write_summary_on(&digest_of(250), day()).await;
        assert!(outcome.page_id.is_none());
        assert_eq!(outcome.chunks_written, 0);
    }
}
