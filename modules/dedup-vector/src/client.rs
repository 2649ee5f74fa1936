use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, VectorError};

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    row_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    text: &'a str,
    k: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<String>,
}

/// HTTP facade over the external vector-similarity service (§6): `POST /add`
/// indexes a row's text, `POST /query` returns the k nearest row ids.
#[derive(Clone)]
pub struct VectorClient {
    client: reqwest::Client,
    base_url: String,
}

impl VectorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build vector service HTTP client"),
            base_url: base_url.into(),
        }
    }

    /// Index `text` under `row_id`. Fallible — callers that must never block
    /// acceptance on this (§4.6, §7 `VectorTransient`) should use
    /// [`VectorClient::add_best_effort`] instead.
    pub async fn add(&self, row_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/add", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&AddRequest { row_id, text })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VectorError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }

    /// Fire `add` and swallow any failure, logging it. Acceptance is never
    /// blocked by a vector-service outage (§4.6, §7).
    pub async fn add_best_effort(&self, row_id: &str, text: &str) {
        if let Err(err) = self.add(row_id, text).await {
            tracing::warn!(row_id, error = %err, "vector add failed, continuing without it");
        }
    }

    /// Query the k nearest row ids for `text`. Fallible — prefer
    /// [`VectorClient::query_or_empty`] for candidate-pool assembly, which
    /// degrades recall rather than failing ingestion (§4.4, §7, B4).
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<String>> {
        let url = format!("{}/query", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&QueryRequest { text, k })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VectorError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: QueryResponse = resp.json().await?;
        Ok(parsed.ids)
    }

    /// Same as [`VectorClient::query`] but never fails: network or parse
    /// errors degrade to an empty hit list (§7, B4).
    pub async fn query_or_empty(&self, text: &str, k: usize) -> Vec<String> {
        match self.query(text, k).await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(error = %err, "vector query failed, degrading to empty recall");
                Vec::new()
            }
        }
    }
}
