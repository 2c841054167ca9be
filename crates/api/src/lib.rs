//! `api` crate — the HTTP surface that sits outside the core (spec.md §1:
//! "HTTP/CLI surfaces ... consume the core only through the orchestrator's
//! public submit/inspect API").
//!
//! Exposes:
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   DELETE /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/execute
//!   GET    /api/v1/executions/:id
//!   GET    /api/v1/executions/:id/timeline
//!   POST   /webhook/:path

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use db::{DbPool, EventBus};
use queue::PriorityQueue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state every handler sees. The API never touches a node executor
/// or the orchestrator directly — it only writes `Execution` rows and
/// enqueues `ExecutionRequest`s, the same admission path a trigger uses.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub queue: Arc<PriorityQueue>,
    pub events: Arc<EventBus>,
}

pub async fn serve(bind: &str, state: AppState) -> Result<(), std::io::Error> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/workflows", get(handlers::workflows::list).post(handlers::workflows::create))
        .route("/workflows/:id", get(handlers::workflows::get).delete(handlers::workflows::delete))
        .route("/workflows/:id/execute", post(handlers::executions::execute))
        .route("/executions/:id", get(handlers::executions::inspect))
        .route("/executions/:id/timeline", get(handlers::executions::timeline));

    let app = Router::new()
        .nest("/api/v1", api_router)
        .route("/webhook/:path", post(handlers::webhooks::handle_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
