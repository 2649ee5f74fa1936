pub mod history;
pub mod stats;
pub mod websets;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/websets", post(websets::create_webset))
        .route("/api/websets/{id}/stream", get(websets::stream_webset))
        .route("/api/history/websets", get(history::list_history))
        .route("/api/history/websets/{id}", get(history::job_detail))
        .route("/api/stats/overview", get(stats::overview))
        .route("/api/stats/database", get(stats::database))
        .route("/api/stats/url-resolution", get(stats::url_resolution))
        .route("/", get(|| async { "ok" }))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}
