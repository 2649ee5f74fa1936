//! The opaque upstream webset provider (§6): create a webset, poll its
//! status, and list items by cursor. Modeled as a trait so the controller
//! can be driven by a fake in tests; [`ExaUpstreamClient`] is the real HTTP
//! implementation against the `EXA_API_KEY`-gated search API named in §6.

use async_trait::async_trait;
use dedup_common::{DedupError, Item};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the caller asked for when creating a job (§6: `{search:{query,
/// count,entity?},enrichments?}`).
#[derive(Debug, Clone, Serialize)]
pub struct WebsetRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichments: Option<serde_json::Value>,
}

/// Upstream's coarse lifecycle status for a webset, surfaced on the event
/// stream as `status` frames (§6, §4.7).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamStatus {
    Processing,
    Idle,
    #[serde(other)]
    Other,
}

/// One page of `GET items` results (§6: `{data, hasMore, nextCursor}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ListPage {
    pub data: Vec<Item>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Items fetched per poll tick (§4.7: "fetch pages by cursor, limit 100 per
/// page").
pub const PAGE_SIZE: u32 = 100;

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Create the webset upstream-side and return its id. Fatal on failure
    /// — the caller cannot begin a job without this (`UpstreamFatal`).
    async fn create_webset(&self, request: &WebsetRequest) -> Result<String, DedupError>;

    async fn poll_status(&self, webset_id: &str) -> Result<UpstreamStatus, DedupError>;

    async fn list_items(
        &self,
        webset_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ListPage, DedupError>;
}

#[derive(Debug, Deserialize)]
struct CreateWebsetResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PollStatusResponse {
    status: UpstreamStatus,
}

/// HTTP-backed [`UpstreamClient`] against the search provider (§6).
pub struct ExaUpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ExaUpstreamClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build upstream HTTP client"),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl UpstreamClient for ExaUpstreamClient {
    async fn create_webset(&self, request: &WebsetRequest) -> Result<String, DedupError> {
        let url = format!("{}/websets", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| DedupError::UpstreamFatal(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DedupError::UpstreamFatal(format!("create webset failed ({status}): {body}")));
        }

        let parsed: CreateWebsetResponse = resp
            .json()
            .await
            .map_err(|e| DedupError::UpstreamFatal(e.to_string()))?;
        Ok(parsed.id)
    }

    async fn poll_status(&self, webset_id: &str) -> Result<UpstreamStatus, DedupError> {
        let url = format!("{}/websets/{webset_id}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| DedupError::UpstreamTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DedupError::UpstreamTransient(format!(
                "poll status returned {}",
                resp.status()
            )));
        }

        let parsed: PollStatusResponse = resp
            .json()
            .await
            .map_err(|e| DedupError::UpstreamTransient(e.to_string()))?;
        Ok(parsed.status)
    }

    async fn list_items(
        &self,
        webset_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ListPage, DedupError> {
        let url = format!("{}/websets/{webset_id}/items", self.base_url);
        let mut req = self.client.get(&url).bearer_auth(&self.api_key).query(&[("limit", limit)]);
        if let Some(cursor) = cursor {
            req = req.query(&[("cursor", cursor)]);
        }

        let resp = req.send().await.map_err(|e| DedupError::UpstreamTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DedupError::UpstreamTransient(format!(
                "list items returned {}",
                resp.status()
            )));
        }

        resp.json().await.map_err(|e| DedupError::UpstreamTransient(e.to_string()))
    }
}
