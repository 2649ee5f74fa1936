//! `GET /api/stats/overview`, `GET /api/stats/database`, and
//! `GET /api/stats/url-resolution` (§6) — read-only projections over
//! existing counters, named in the external interface list but not designed
//! in detail (SPEC_FULL §3).

use axum::extract::State;
use axum::Json;
use dedup_common::OverviewStats;
use dedup_vector::UrlResolutionStats;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn overview(State(state): State<AppState>) -> Result<Json<OverviewStats>, ApiError> {
    Ok(Json(state.persistence.overview_stats().await?))
}

#[derive(Debug, Serialize)]
pub struct DatabaseStats {
    #[serde(flatten)]
    pub overview: OverviewStats,
    pub dedup_enabled: bool,
    pub url_resolution_enabled: bool,
}

/// Same aggregate counters as `overview`, plus the feature-flag state that
/// shaped them — useful for diagnosing "why does this job have no
/// rejections" without re-reading `ENABLE_DEDUP` from the process env.
pub async fn database(State(state): State<AppState>) -> Result<Json<DatabaseStats>, ApiError> {
    let overview = state.persistence.overview_stats().await?;
    Ok(Json(DatabaseStats {
        overview,
        dedup_enabled: state.config.enable_dedup,
        url_resolution_enabled: state.config.enable_url_resolution,
    }))
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UrlResolutionResponse {
    Disabled,
    Enabled {
        #[serde(flatten)]
        stats: WireUrlResolutionStats,
    },
}

#[derive(Debug, Serialize)]
pub struct WireUrlResolutionStats {
    pub hits: u64,
    pub misses: u64,
    pub resolved: u64,
    pub failed: u64,
    pub cache_size: usize,
}

impl From<UrlResolutionStats> for WireUrlResolutionStats {
    fn from(s: UrlResolutionStats) -> Self {
        Self { hits: s.hits, misses: s.misses, resolved: s.resolved, failed: s.failed, cache_size: s.cache_size }
    }
}

pub async fn url_resolution(State(state): State<AppState>) -> Json<UrlResolutionResponse> {
    match &state.url_resolver {
        Some(resolver) => {
            Json(UrlResolutionResponse::Enabled { stats: resolver.stats().await.into() })
        }
        None => Json(UrlResolutionResponse::Disabled),
    }
}
