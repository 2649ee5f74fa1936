//! The default [`PersistenceAdapter`] (§4.8, SPEC_FULL §4): an in-process
//! store behind `tokio::sync::RwLock`, shaped like the `jobs`/`items`
//! document collections §6 describes so a real document-store adapter (the
//! same trait boundary `rootsignal-api` uses for `GraphClient`) can drop in
//! without the rest of the workspace noticing.
//!
//! Counter increments here are lock-serialized, not optimistic — there is no
//! write-conflict to retry. The jittered bounded-retry §4.8/§9 call for
//! belongs to a document-store adapter with real compare-and-swap
//! contention; it has no counterpart in this default implementation (see
//! DESIGN.md).

use std::collections::HashMap;

use async_trait::async_trait;
use dedup_common::{CounterOutcome, ItemRecord, Job, JobStatus, OverviewStats, PersistenceAdapter};
use tokio::sync::RwLock;

#[derive(Default)]
struct Store {
    jobs: HashMap<String, Job>,
    /// Insertion order preserved per job for history queries and replay.
    items: HashMap<String, Vec<ItemRecord>>,
}

/// In-memory `jobs`/`items` store (§6). Not durable across process
/// restarts — matching the Non-goal that rules out cross-process
/// persistence guarantees.
#[derive(Default)]
pub struct InMemoryStore {
    store: RwLock<Store>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryStore {
    async fn create_job(&self, job: Job) -> anyhow::Result<()> {
        let mut store = self.store.write().await;
        store.items.entry(job.job_id.clone()).or_default();
        store.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        Ok(self.store.read().await.jobs.get(job_id).cloned())
    }

    async fn list_jobs(&self, limit: usize) -> anyhow::Result<Vec<Job>> {
        let store = self.store.read().await;
        let mut jobs: Vec<Job> = store.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn set_next_cursor(&self, job_id: &str, cursor: Option<String>) -> anyhow::Result<()> {
        let mut store = self.store.write().await;
        if let Some(job) = store.jobs.get_mut(job_id) {
            job.next_cursor = cursor;
        }
        Ok(())
    }

    async fn set_status(&self, job_id: &str, status: JobStatus) -> anyhow::Result<()> {
        let mut store = self.store.write().await;
        if let Some(job) = store.jobs.get_mut(job_id) {
            job.status = status;
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> anyhow::Result<()> {
        let mut store = self.store.write().await;
        if let Some(job) = store.jobs.get_mut(job_id) {
            job.status = status;
            job.error_message = error_message;
            job.completed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    /// A duplicate `(job_id, item_id)` pair is a warning, not a failure
    /// (§4.8) — idempotent re-ingestion at the engine level should already
    /// prevent this, so seeing one here means the engine's `processedIds`
    /// guard was bypassed somewhere.
    async fn record_item(&self, record: ItemRecord) -> anyhow::Result<()> {
        let mut store = self.store.write().await;
        let items = store.items.entry(record.job_id.clone()).or_default();
        if items.iter().any(|existing| existing.item_id == record.item_id) {
            tracing::warn!(job_id = %record.job_id, item_id = %record.item_id, "duplicate item record ignored");
            return Ok(());
        }
        items.push(record);
        Ok(())
    }

    async fn list_items(&self, job_id: &str) -> anyhow::Result<Vec<ItemRecord>> {
        Ok(self.store.read().await.items.get(job_id).cloned().unwrap_or_default())
    }

    async fn increment_counters(&self, job_id: &str, outcome: CounterOutcome) -> anyhow::Result<()> {
        let mut store = self.store.write().await;
        let Some(job) = store.jobs.get_mut(job_id) else {
            tracing::warn!(job_id, "increment_counters on unknown job");
            return Ok(());
        };
        job.total_items += 1;
        match outcome {
            CounterOutcome::Accepted => job.unique_items += 1,
            CounterOutcome::Rejected { reason } => {
                job.duplicates_rejected += 1;
                *job.rejection_reasons.entry(reason.to_string()).or_insert(0) += 1;
            }
        }
        Ok(())
    }

    async fn overview_stats(&self) -> anyhow::Result<OverviewStats> {
        let store = self.store.read().await;
        let mut stats = OverviewStats::default();
        stats.jobs_total = store.jobs.len() as u64;
        for job in store.jobs.values() {
            if matches!(job.status, JobStatus::Active | JobStatus::Processing | JobStatus::ProcessingItems) {
                stats.jobs_active += 1;
            }
            stats.items_total += job.total_items;
            stats.items_unique += job.unique_items;
            stats.items_duplicates += job.duplicates_rejected;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedup_common::{DedupMode, ItemStatus, RejectionReason};

    fn sample_job(id: &str) -> Job {
        Job::new(id, "query", None)
    }

    fn sample_item(job_id: &str, item_id: &str, status: ItemStatus) -> ItemRecord {
        ItemRecord {
            job_id: job_id.to_string(),
            item_id: item_id.to_string(),
            name: "Acme".into(),
            url: "https://acme.com".into(),
            properties: serde_json::Value::Null,
            raw_data: serde_json::Value::Null,
            status,
            rejected_by: None,
            rejection_reason: None,
            rejection_details: None,
            normalized_title: None,
            similarity: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_job_round_trips() {
        let store = InMemoryStore::new();
        store.create_job(sample_job("j1")).await.unwrap();
        let job = store.get_job("j1").await.unwrap().unwrap();
        assert_eq!(job.job_id, "j1");
        assert_eq!(job.mode(), DedupMode::Company);
    }

    #[tokio::test]
    async fn counters_increment_atomically_per_outcome() {
        let store = InMemoryStore::new();
        store.create_job(sample_job("j1")).await.unwrap();
        store.increment_counters("j1", CounterOutcome::Accepted).await.unwrap();
        store
            .increment_counters("j1", CounterOutcome::Rejected { reason: RejectionReason::ExactMatch })
            .await
            .unwrap();

        let job = store.get_job("j1").await.unwrap().unwrap();
        assert_eq!(job.total_items, 2);
        assert_eq!(job.unique_items, 1);
        assert_eq!(job.duplicates_rejected, 1);
        assert_eq!(job.rejection_reasons.get("exact_match"), Some(&1));
    }

    #[tokio::test]
    async fn duplicate_item_record_is_ignored_not_failed() {
        let store = InMemoryStore::new();
        store.create_job(sample_job("j1")).await.unwrap();
        store.record_item(sample_item("j1", "a", ItemStatus::Accepted)).await.unwrap();
        store.record_item(sample_item("j1", "a", ItemStatus::Accepted)).await.unwrap();

        let items = store.list_items("j1").await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn list_jobs_orders_most_recent_first() {
        let store = InMemoryStore::new();
        let mut older = sample_job("older");
        older.created_at = chrono::Utc::now() - chrono::Duration::hours(1);
        store.create_job(older).await.unwrap();
        store.create_job(sample_job("newer")).await.unwrap();

        let jobs = store.list_jobs(10).await.unwrap();
        assert_eq!(jobs[0].job_id, "newer");
        assert_eq!(jobs[1].job_id, "older");
    }

    #[tokio::test]
    async fn overview_stats_aggregate_across_jobs() {
        let store = InMemoryStore::new();
        store.create_job(sample_job("j1")).await.unwrap();
        store.increment_counters("j1", CounterOutcome::Accepted).await.unwrap();

        let stats = store.overview_stats().await.unwrap();
        assert_eq!(stats.jobs_total, 1);
        assert_eq!(stats.jobs_active, 1);
        assert_eq!(stats.items_unique, 1);
    }
}
