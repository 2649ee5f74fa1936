//! `POST /api/websets` (job creation) and `GET /api/websets/:id/stream`
//! (SSE event stream), the two job-lifecycle endpoints named in §6.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use dedup_common::DedupMode;
use dedup_engine::{DedupEngine, LlmAdjudicator};
use dedup_ingest::JobContext;
use futures::Stream;
use serde::{Deserialize, Serialize};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWebsetRequest {
    pub query: String,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub enrichments: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateWebsetResponse {
    #[serde(rename = "websetId")]
    pub webset_id: String,
}

/// `POST /api/websets`: create the upstream webset, persist the job, and
/// spawn the controller's poll loop. Returns as soon as the job exists so
/// the caller can immediately subscribe to its stream (§6, §4.7).
pub async fn create_webset(
    State(state): State<AppState>,
    Json(req): Json<CreateWebsetRequest>,
) -> Result<Json<CreateWebsetResponse>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::Validation("query must not be empty".to_string()));
    }

    let mode = if req.entity.is_some() { DedupMode::Entity } else { DedupMode::Company };

    let webset_id = state
        .controller
        .create_job(req.query, req.entity.clone(), req.count, req.enrichments)
        .await?;

    let llm = LlmAdjudicator::new(Arc::clone(&state.llm), mode);
    let url_resolver = if mode == DedupMode::Company { state.url_resolver.clone() } else { None };
    let engine = Arc::new(DedupEngine::with_dedup_enabled(
        webset_id.clone(),
        mode,
        llm,
        Arc::clone(&state.vector),
        url_resolver,
        state.config.enable_url_resolution,
        state.bus.clone(),
        Arc::clone(&state.persistence),
        state.config.enable_dedup,
    ));

    let cancel = state.shutdown.child_token();
    let ctx = JobContext { job_id: webset_id.clone(), engine, cancel };
    let controller = Arc::clone(&state.controller);

    tokio::spawn(async move {
        controller.run_job(ctx, mode).await;
    });

    Ok(Json(CreateWebsetResponse { webset_id }))
}

/// `GET /api/websets/:id/stream`: Server-Sent Events, one `data: <json>\n\n`
/// frame per [`dedup_events::EventFrame`] (§6, §4.9).
pub async fn stream_webset(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.bus.subscribe(&job_id).await;
    let stream = async_stream::stream! {
        while let Some(frame) = subscription.recv().await {
            let payload = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
            yield Ok(Event::default().data(payload));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_query_is_rejected() {
        let req = CreateWebsetRequest {
            query: "   ".to_string(),
            count: None,
            entity: None,
            enrichments: None,
        };
        assert!(req.query.trim().is_empty());
    }

    #[test]
    fn entity_present_selects_entity_mode() {
        let with_entity = Some("person".to_string());
        let mode = if with_entity.is_some() { DedupMode::Entity } else { DedupMode::Company };
        assert_eq!(mode, DedupMode::Entity);
    }

    #[test]
    fn missing_entity_selects_company_mode() {
        let without_entity: Option<String> = None;
        let mode = if without_entity.is_some() { DedupMode::Entity } else { DedupMode::Company };
        assert_eq!(mode, DedupMode::Company);
    }

    #[test]
    fn response_serializes_camel_case_webset_id() {
        let body = CreateWebsetResponse { webset_id: "ws_1".to_string() };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json, serde_json::json!({ "websetId": "ws_1" }));
    }
}
