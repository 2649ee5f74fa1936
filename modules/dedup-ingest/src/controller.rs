//! The ingestion controller (§4.7, §4.10): drives one job's lifecycle from
//! webset creation through polling to `finished`/`error`, feeding new items
//! to a [`DedupEngine`] sequentially (entity mode) or concurrently (company
//! mode).
//!
//! Cancellation is a shared [`tokio_util::sync::CancellationToken`] checked
//! between poll ticks — the same role `rootsignal-api`'s `scout_cancel:
//! Arc<AtomicBool>` plays for scout runs, expressed with the cooperative
//! primitive the wider tokio ecosystem gives this exact job.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dedup_common::{DedupMode, Job, JobStatus, PersistenceAdapter};
use dedup_engine::DedupEngine;
use dedup_events::{Bus, EventFrame};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::upstream::{ListPage, UpstreamClient, UpstreamStatus, WebsetRequest, PAGE_SIZE};

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const JOB_BUDGET: Duration = Duration::from_secs(50 * 60);

/// Everything one running job needs, owned by its controller task.
pub struct JobContext {
    pub job_id: String,
    pub engine: Arc<DedupEngine>,
    pub cancel: CancellationToken,
}

/// Drives a job from creation to a terminal state. One instance is spawned
/// per job by [`run_job`]; it is not reused across jobs.
pub struct IngestionController {
    upstream: Arc<dyn UpstreamClient>,
    persistence: Arc<dyn PersistenceAdapter>,
    bus: Bus,
}

impl IngestionController {
    pub fn new(upstream: Arc<dyn UpstreamClient>, persistence: Arc<dyn PersistenceAdapter>, bus: Bus) -> Self {
        Self { upstream, persistence, bus }
    }

    /// Create the upstream webset and persist the job record. Returns the
    /// upstream webset id, which doubles as the job id throughout (§6).
    pub async fn create_job(
        &self,
        query: String,
        entity_type: Option<String>,
        count: Option<u32>,
        enrichments: Option<serde_json::Value>,
    ) -> Result<String, dedup_common::DedupError> {
        let request = WebsetRequest { query: query.clone(), count, entity: entity_type.clone(), enrichments };
        let webset_id = self.upstream.create_webset(&request).await?;

        let job = Job::new(webset_id.clone(), query, entity_type);
        self.persistence
            .create_job(job)
            .await
            .map_err(|e| dedup_common::DedupError::Persistence(e.to_string()))?;
        self.bus.create_job(&webset_id).await;

        Ok(webset_id)
    }

    /// Run the poll loop to completion: poll upstream status every
    /// [`POLL_INTERVAL`] up to [`JOB_BUDGET`] wall-clock, paginate new items
    /// by cursor, and feed each to `ctx.engine`. Returns once the job has
    /// reached a terminal state (`completed` or `error`).
    pub async fn run_job(&self, ctx: JobContext, mode: DedupMode) {
        let deadline = Instant::now() + JOB_BUDGET;
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut processed: u64 = 0;
        let mut rejected: u64 = 0;

        // `active → processing` (§4.10): the job leaves `active` as soon as
        // the poll loop starts, before the first tick is even attempted.
        if let Err(err) = self.persistence.set_status(&ctx.job_id, JobStatus::Processing).await {
            tracing::warn!(job_id = %ctx.job_id, error = %err, "failed to persist processing status");
        }

        let outcome = loop {
            if ctx.cancel.is_cancelled() {
                break JobOutcome::Error("job cancelled".to_string());
            }
            if Instant::now() >= deadline {
                break JobOutcome::Finished;
            }

            match self.upstream.poll_status(&ctx.job_id).await {
                Ok(UpstreamStatus::Idle) => {
                    // Upstream is done producing; §6's `idle` status frame is
                    // distinct from the `finished` event that follows once any
                    // final page is drained.
                    self.bus.publish(&ctx.job_id, EventFrame::Status { status: "idle".into(), item_count: Some(processed) }).await;
                    self.drain_pages(&ctx, mode, &mut cursor, &mut seen_ids, &mut processed, &mut rejected).await;
                    break JobOutcome::Finished;
                }
                Ok(UpstreamStatus::Processing) | Ok(UpstreamStatus::Other) => {
                    self.bus
                        .publish(&ctx.job_id, EventFrame::Status { status: "processing".into(), item_count: Some(processed) })
                        .await;
                    self.drain_pages(&ctx, mode, &mut cursor, &mut seen_ids, &mut processed, &mut rejected).await;
                }
                Err(dedup_common::DedupError::UpstreamFatal(msg)) => {
                    break JobOutcome::Error(msg);
                }
                Err(err) => {
                    // Transient: this poll tick is lost, retried on the next one (§5).
                    tracing::warn!(job_id = %ctx.job_id, error = %err, "poll_status failed, retrying next tick");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = ctx.cancel.cancelled() => {}
            }
        };

        // A pending decision might still be in flight; give it a chance to
        // settle before declaring the job complete (§4.10: "pending must
        // reach a terminal state before the job is marked completed").
        for _ in 0..50 {
            if ctx.engine.is_settled().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        match outcome {
            JobOutcome::Finished => {
                let total = ctx.engine.processed_items() + ctx.engine.rejected_items();
                self.bus
                    .publish(&ctx.job_id, EventFrame::Finished { status: "idle".into(), total_items: total })
                    .await;
                if let Err(err) = self.persistence.finish_job(&ctx.job_id, JobStatus::Completed, None).await {
                    tracing::warn!(job_id = %ctx.job_id, error = %err, "failed to persist job completion");
                }
            }
            JobOutcome::Error(message) => {
                self.bus.publish(&ctx.job_id, EventFrame::Error { error: message.clone() }).await;
                if let Err(err) = self
                    .persistence
                    .finish_job(&ctx.job_id, JobStatus::Error, Some(message))
                    .await
                {
                    tracing::warn!(job_id = %ctx.job_id, error = %err, "failed to persist job error");
                }
            }
        }

        self.bus.remove_job(&ctx.job_id).await;
    }

    /// Fetch and feed every page currently available, stopping at the first
    /// page that has no more new data or that errors (retried next tick).
    async fn drain_pages(
        &self,
        ctx: &JobContext,
        mode: DedupMode,
        cursor: &mut Option<String>,
        seen_ids: &mut HashSet<String>,
        processed: &mut u64,
        rejected: &mut u64,
    ) {
        loop {
            let page: ListPage = match self.upstream.list_items(&ctx.job_id, cursor.as_deref(), PAGE_SIZE).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(job_id = %ctx.job_id, error = %err, "list_items failed, pagination stops for this tick");
                    return;
                }
            };

            let new_items: Vec<_> = page.data.into_iter().filter(|item| seen_ids.insert(item.id.clone())).collect();

            if !new_items.is_empty() {
                // `processing → processing_items` (§4.10): transient status
                // while this batch is handed to the engine, then back to
                // `processing` once it settles.
                self.bus.publish(&ctx.job_id, EventFrame::Status { status: "processing_items".into(), item_count: Some(ctx.engine.processed_items()) }).await;
                if let Err(err) = self.persistence.set_status(&ctx.job_id, JobStatus::ProcessingItems).await {
                    tracing::warn!(job_id = %ctx.job_id, error = %err, "failed to persist processing_items status");
                }

                match mode {
                    DedupMode::Entity => {
                        for item in new_items {
                            ctx.engine.process_item(item).await;
                        }
                    }
                    DedupMode::Company => {
                        let engine = Arc::clone(&ctx.engine);
                        let tasks = new_items.into_iter().map(|item| {
                            let engine = Arc::clone(&engine);
                            async move { engine.process_item(item).await }
                        });
                        join_all(tasks).await;
                    }
                }

                self.bus.publish(&ctx.job_id, EventFrame::Status { status: "processing".into(), item_count: Some(ctx.engine.processed_items()) }).await;
                if let Err(err) = self.persistence.set_status(&ctx.job_id, JobStatus::Processing).await {
                    tracing::warn!(job_id = %ctx.job_id, error = %err, "failed to persist processing status");
                }
            }

            *processed = ctx.engine.processed_items();
            *rejected = ctx.engine.rejected_items();

            if let Err(err) = self.persistence.set_next_cursor(&ctx.job_id, page.next_cursor.clone()).await {
                tracing::warn!(job_id = %ctx.job_id, error = %err, "failed to persist next cursor");
            }
            *cursor = page.next_cursor;

            if !page.has_more {
                return;
            }
        }
    }
}

enum JobOutcome {
    Finished,
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dedup_common::{CounterOutcome, Item, ItemRecord};
    use dedup_engine::{LlmAdjudicator, LlmClient};
    use dedup_vector::VectorClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    struct ScriptedUpstream {
        pages: TokioMutex<Vec<ListPage>>,
        poll_calls: AtomicUsize,
    }

    #[async_trait]
    impl UpstreamClient for ScriptedUpstream {
        async fn create_webset(&self, _request: &WebsetRequest) -> Result<String, dedup_common::DedupError> {
            Ok("job-1".to_string())
        }

        async fn poll_status(&self, _webset_id: &str) -> Result<UpstreamStatus, dedup_common::DedupError> {
            let n = self.poll_calls.fetch_add(1, Ordering::Relaxed);
            if n == 0 {
                Ok(UpstreamStatus::Processing)
            } else {
                Ok(UpstreamStatus::Idle)
            }
        }

        async fn list_items(
            &self,
            _webset_id: &str,
            _cursor: Option<&str>,
            _limit: u32,
        ) -> Result<ListPage, dedup_common::DedupError> {
            let mut pages = self.pages.lock().await;
            if pages.is_empty() {
                Ok(ListPage { data: vec![], has_more: false, next_cursor: None })
            } else {
                Ok(pages.remove(0))
            }
        }
    }

    struct InMemoryPersistence {
        jobs: TokioMutex<std::collections::HashMap<String, Job>>,
    }

    impl InMemoryPersistence {
        fn new() -> Self {
            Self { jobs: TokioMutex::new(std::collections::HashMap::new()) }
        }
    }

    #[async_trait]
    impl PersistenceAdapter for InMemoryPersistence {
        async fn create_job(&self, job: Job) -> anyhow::Result<()> {
            self.jobs.lock().await.insert(job.job_id.clone(), job);
            Ok(())
        }
        async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
            Ok(self.jobs.lock().await.get(job_id).cloned())
        }
        async fn list_jobs(&self, _limit: usize) -> anyhow::Result<Vec<Job>> {
            Ok(self.jobs.lock().await.values().cloned().collect())
        }
        async fn set_next_cursor(&self, job_id: &str, cursor: Option<String>) -> anyhow::Result<()> {
            if let Some(job) = self.jobs.lock().await.get_mut(job_id) {
                job.next_cursor = cursor;
            }
            Ok(())
        }
        async fn set_status(&self, job_id: &str, status: JobStatus) -> anyhow::Result<()> {
            if let Some(job) = self.jobs.lock().await.get_mut(job_id) {
                job.status = status;
            }
            Ok(())
        }
        async fn finish_job(&self, job_id: &str, status: JobStatus, error_message: Option<String>) -> anyhow::Result<()> {
            if let Some(job) = self.jobs.lock().await.get_mut(job_id) {
                job.status = status;
                job.error_message = error_message;
            }
            Ok(())
        }
        async fn record_item(&self, _record: ItemRecord) -> anyhow::Result<()> {
            Ok(())
        }
        async fn list_items(&self, _job_id: &str) -> anyhow::Result<Vec<ItemRecord>> {
            Ok(vec![])
        }
        async fn increment_counters(&self, _job_id: &str, _outcome: CounterOutcome) -> anyhow::Result<()> {
            Ok(())
        }
        async fn overview_stats(&self) -> anyhow::Result<dedup_common::OverviewStats> {
            Ok(dedup_common::OverviewStats::default())
        }
    }

    struct AlwaysUniqueLlm;

    #[async_trait]
    impl LlmClient for AlwaysUniqueLlm {
        async fn chat_completion(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Ok("[]".to_string())
        }
    }

    fn item(id: &str, name: &str, url: &str) -> Item {
        Item {
            id: id.to_string(),
            url: Some(url.to_string()),
            name: Some(name.to_string()),
            title: None,
            source: None,
            properties: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn drains_one_page_and_finishes_when_upstream_goes_idle() {
        let upstream = Arc::new(ScriptedUpstream {
            pages: TokioMutex::new(vec![ListPage {
                data: vec![item("a", "Acme", "https://acme.com"), item("b", "Globex", "https://globex.com")],
                has_more: false,
                next_cursor: None,
            }]),
            poll_calls: AtomicUsize::new(0),
        });
        let persistence: Arc<dyn PersistenceAdapter> = Arc::new(InMemoryPersistence::new());
        let bus = Bus::new();
        bus.create_job("job-1").await;

        let llm = LlmAdjudicator::new(Arc::new(AlwaysUniqueLlm), DedupMode::Company);
        let vector = Arc::new(VectorClient::new("http://localhost:1"));
        let engine = Arc::new(DedupEngine::new(
            "job-1",
            DedupMode::Company,
            llm,
            vector,
            None,
            false,
            bus.clone(),
            Arc::clone(&persistence),
        ));

        let ctx = JobContext { job_id: "job-1".to_string(), engine: Arc::clone(&engine), cancel: CancellationToken::new() };
        let controller = IngestionController::new(upstream, Arc::clone(&persistence), bus);
        controller.run_job(ctx, DedupMode::Company).await;

        assert_eq!(engine.processed_items(), 2);
        let job = persistence.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn status_frames_walk_active_through_idle_and_finished_says_idle() {
        let upstream = Arc::new(ScriptedUpstream {
            pages: TokioMutex::new(vec![ListPage {
                data: vec![item("a", "Acme", "https://acme.com")],
                has_more: false,
                next_cursor: None,
            }]),
            poll_calls: AtomicUsize::new(0),
        });
        let persistence: Arc<dyn PersistenceAdapter> = Arc::new(InMemoryPersistence::new());
        let bus = Bus::new();
        bus.create_job("job-1").await;
        let mut sub = bus.subscribe("job-1").await;

        let llm = LlmAdjudicator::new(Arc::new(AlwaysUniqueLlm), DedupMode::Company);
        let vector = Arc::new(VectorClient::new("http://localhost:1"));
        let engine = Arc::new(DedupEngine::new(
            "job-1",
            DedupMode::Company,
            llm,
            vector,
            None,
            false,
            bus.clone(),
            Arc::clone(&persistence),
        ));

        let ctx = JobContext { job_id: "job-1".to_string(), engine: Arc::clone(&engine), cancel: CancellationToken::new() };
        let controller = IngestionController::new(upstream, Arc::clone(&persistence), bus);
        controller.run_job(ctx, DedupMode::Company).await;

        assert!(matches!(sub.recv().await, Some(EventFrame::Connected { .. })));

        let mut saw_processing_items = false;
        let mut saw_idle_status = false;
        loop {
            match sub.recv().await {
                Some(EventFrame::Status { status, .. }) if status == "processing_items" => {
                    saw_processing_items = true;
                }
                Some(EventFrame::Status { status, .. }) if status == "idle" => {
                    saw_idle_status = true;
                }
                Some(EventFrame::Finished { status, total_items }) => {
                    assert_eq!(status, "idle");
                    assert_eq!(total_items, 1);
                    break;
                }
                Some(_) => continue,
                None => panic!("bus closed before finished frame"),
            }
        }

        assert!(saw_processing_items, "expected a processing_items status frame");
        assert!(saw_idle_status, "expected an idle status frame before finished");
    }

    #[tokio::test]
    async fn cancellation_token_stops_the_poll_loop() {
        let upstream = Arc::new(ScriptedUpstream { pages: TokioMutex::new(vec![]), poll_calls: AtomicUsize::new(0) });
        let persistence: Arc<dyn PersistenceAdapter> = Arc::new(InMemoryPersistence::new());
        let bus = Bus::new();
        bus.create_job("job-1").await;

        let llm = LlmAdjudicator::new(Arc::new(AlwaysUniqueLlm), DedupMode::Company);
        let vector = Arc::new(VectorClient::new("http://localhost:1"));
        let engine = Arc::new(DedupEngine::new(
            "job-1",
            DedupMode::Company,
            llm,
            vector,
            None,
            false,
            bus.clone(),
            Arc::clone(&persistence),
        ));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = JobContext { job_id: "job-1".to_string(), engine, cancel };
        let controller = IngestionController::new(upstream, Arc::clone(&persistence), bus);
        controller.run_job(ctx, DedupMode::Company).await;

        let job = persistence.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
    }
}
