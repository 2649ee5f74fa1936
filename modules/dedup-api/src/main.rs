use std::sync::Arc;

use anyhow::Result;
use dedup_common::Config;
use dedup_engine::LlmClient;
use dedup_events::Bus;
use dedup_ingest::{ExaUpstreamClient, IngestionController, InMemoryStore, UpstreamClient};
use dedup_vector::{UrlResolver, VectorClient};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod error;
mod routes;
mod state;

use state::AppState;

const DEFAULT_EXA_BASE_URL: &str = "https://api.exa.ai/websets/v0";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

fn build_llm_client(config: &Config) -> Arc<dyn LlmClient> {
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
    let client = ai_client::OpenAi::new(config.google_api_key.clone(), model).with_base_url(DEFAULT_GEMINI_BASE_URL);
    Arc::new(client)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dedup=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let exa_base_url = std::env::var("EXA_BASE_URL").unwrap_or_else(|_| DEFAULT_EXA_BASE_URL.to_string());
    let upstream: Arc<dyn UpstreamClient> =
        Arc::new(ExaUpstreamClient::new(exa_base_url, config.exa_api_key.clone()));

    let persistence: Arc<dyn dedup_common::PersistenceAdapter> = Arc::new(InMemoryStore::new());
    let bus = Bus::new();
    let vector = Arc::new(VectorClient::new(config.vector_url.clone()));
    let url_resolver = if config.enable_url_resolution { Some(Arc::new(UrlResolver::new())) } else { None };
    let llm = build_llm_client(&config);

    let controller = Arc::new(IngestionController::new(
        Arc::clone(&upstream),
        Arc::clone(&persistence),
        bus.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        persistence,
        bus,
        controller,
        vector,
        url_resolver,
        llm,
        shutdown: CancellationToken::new(),
        upstream,
    };

    let app = routes::router(state.clone());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(addr = %addr, "dedup-api starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    Ok(())
}

/// Waits for ctrl_c, then cancels every running job's [`CancellationToken`]
/// (§5, §9 — mirrors the source project's `scout_cancel: Arc<AtomicBool>`
/// pattern with the cooperative primitive tokio's ecosystem gives this
/// exact job).
async fn shutdown_signal(shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, cancelling in-flight jobs");
    shutdown.cancel();
}
