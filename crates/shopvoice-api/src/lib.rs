//! ShopVoice API /v1: REST endpoints over the answer pipeline
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use shopvoice_core::PipelineRunner;

pub use config::AppConfig;
pub use metrics::Metrics;

/// Shared per-process state. The runner and its clients are built once.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<PipelineRunner>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(runner: PipelineRunner) -> Result<Self, prometheus::Error> {
        Ok(Self {
            runner: Arc::new(runner),
            metrics: Arc::new(Metrics::new()?),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/ask", post(handlers::ask))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn(middleware::propagate_trace_id))
        .layer(middleware::cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("ShopVoice API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
