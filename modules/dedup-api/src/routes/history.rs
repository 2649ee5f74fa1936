//! `GET /api/history/websets` and `GET /api/history/websets/:id` (§6): read
//! past and in-flight jobs back out of the persistence adapter.

use axum::extract::{Path, Query, State};
use axum::Json;
use dedup_common::{Job, ItemRecord};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let jobs = state.persistence.list_jobs(query.limit).await?;
    Ok(Json(jobs))
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    pub items: Vec<ItemRecord>,
}

pub async fn job_detail(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobDetail>, ApiError> {
    let job = state
        .persistence
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no job with id {job_id}")))?;
    let items = state.persistence.list_items(&job_id).await?;
    Ok(Json(JobDetail { job, items }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_is_twenty() {
        assert_eq!(default_limit(), 20);
    }

    #[test]
    fn missing_limit_falls_back_to_default() {
        let query: ListQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, 20);
    }

    #[test]
    fn explicit_limit_is_honored() {
        let query: ListQuery = serde_json::from_str(r#"{"limit":5}"#).unwrap();
        assert_eq!(query.limit, 5);
    }
}
