//! Process-wide shared state for the axum app: the components §5 says are
//! shared across jobs (persistence, broadcast bus, vector client, the
//! global URL-resolution cache, the LLM client) plus the ingestion
//! controller that drives each job's poll loop.

use std::sync::Arc;

use dedup_common::{Config, PersistenceAdapter};
use dedup_engine::LlmClient;
use dedup_events::Bus;
use dedup_ingest::{IngestionController, UpstreamClient};
use dedup_vector::{UrlResolver, VectorClient};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persistence: Arc<dyn PersistenceAdapter>,
    pub bus: Bus,
    pub controller: Arc<IngestionController>,
    pub vector: Arc<VectorClient>,
    pub url_resolver: Option<Arc<UrlResolver>>,
    pub llm: Arc<dyn LlmClient>,
    /// Parent of every running job's cancellation token (§5, §9): cancelling
    /// this on shutdown cancels every in-flight poll loop.
    pub shutdown: CancellationToken,
    #[allow(dead_code)]
    pub upstream: Arc<dyn UpstreamClient>,
}
