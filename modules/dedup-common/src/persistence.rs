use async_trait::async_trait;

use crate::reason::RejectionReason;
use crate::types::{Job, ItemRecord};

/// Outcome recorded against a job's atomic counters (§4.8). Exactly one of
/// these is applied per finalized item.
#[derive(Debug, Clone)]
pub enum CounterOutcome {
    Accepted,
    Rejected { reason: RejectionReason },
}

/// Read-only aggregate counters backing `GET /api/stats/overview` and
/// `GET /api/stats/database` (§3 of SPEC_FULL — named in spec §6 but not
/// designed there).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OverviewStats {
    pub jobs_total: u64,
    pub jobs_active: u64,
    pub items_total: u64,
    pub items_unique: u64,
    pub items_duplicates: u64,
}

/// The persistence boundary described in §4.8 and §6: a document store with
/// `jobs` and `items` collections, atomic counter increments, and
/// bounded-retry writes. Implementations must never let a write failure
/// propagate into a stalled ingestion (§7 `Persistence`) — callers treat a
/// returned `Err` as already logged and recovered from, not as a reason to
/// stop the job.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn create_job(&self, job: Job) -> anyhow::Result<()>;

    async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>>;

    async fn list_jobs(&self, limit: usize) -> anyhow::Result<Vec<Job>>;

    async fn set_next_cursor(&self, job_id: &str, cursor: Option<String>) -> anyhow::Result<()>;

    /// Moves a job through the non-terminal states of its lifecycle (§4.10:
    /// `active → processing → processing_items ↺`). Terminal transitions
    /// (`completed`/`error`) go through [`PersistenceAdapter::finish_job`]
    /// instead, since those also set `completedAt`/`errorMessage`.
    async fn set_status(&self, job_id: &str, status: crate::types::JobStatus) -> anyhow::Result<()>;

    async fn finish_job(
        &self,
        job_id: &str,
        status: crate::types::JobStatus,
        error_message: Option<String>,
    ) -> anyhow::Result<()>;

    /// Insert an item document. A duplicate-key error for an already-recorded
    /// `(job_id, item_id)` pair is a warning, not a failure (§4.8).
    async fn record_item(&self, record: ItemRecord) -> anyhow::Result<()>;

    async fn list_items(&self, job_id: &str) -> anyhow::Result<Vec<ItemRecord>>;

    /// One atomic update: `totalItems` plus exactly one of `uniqueItems` /
    /// `duplicatesRejected`, plus `rejectionReasons.<reason>` on reject
    /// (§4.8).
    async fn increment_counters(&self, job_id: &str, outcome: CounterOutcome) -> anyhow::Result<()>;

    async fn overview_stats(&self) -> anyhow::Result<OverviewStats>;
}
