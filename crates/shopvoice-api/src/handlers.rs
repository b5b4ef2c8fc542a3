//! API Handlers
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{error, info};

use shopvoice_core::{ExecutionContext, PipelineOutcome, SHOPVOICE_VERSION};
use shopvoice_quality::QualityValidator;

use crate::metrics::encode;
use crate::middleware::TRACE_HEADER;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub transcript: String,
}

pub async fn health(State(app): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": SHOPVOICE_VERSION,
            "pipeline": app.runner.pipeline_id(),
        })),
    )
}

pub async fn ask(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> (StatusCode, Json<Value>) {
    let ctx = match headers.get(TRACE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) if !id.trim().is_empty() => ExecutionContext::with_trace_id(id.trim()),
        _ => ExecutionContext::new(),
    };

    let start = Instant::now();
    match app.runner.run(&request.transcript, &ctx).await {
        Ok(outcome) => {
            let status = validation_status(&outcome);
            app.metrics.observe(&status, start.elapsed().as_secs_f64());
            info!(trace_id = %outcome.trace_id, status = %status, "request answered");
            (
                StatusCode::OK,
                Json(json!({
                    "trace_id": outcome.trace_id,
                    "pipeline_id": outcome.pipeline_id,
                    "status": status,
                    "answer": outcome.state.answer_text(),
                    "citations": outcome.state.citations,
                    "state": outcome.state,
                    "stages": outcome.stages,
                })),
            )
        }
        Err(e) => {
            app.metrics.observe("error", start.elapsed().as_secs_f64());
            error!(trace_id = %ctx.trace_id, error = %e, "pipeline failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "trace_id": ctx.trace_id })),
            )
        }
    }
}

pub async fn metrics(State(app): State<AppState>) -> Response {
    match encode(app.metrics.registry()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Overall status recorded by the validator, `unknown` if it did not run.
fn validation_status(outcome: &PipelineOutcome) -> String {
    outcome
        .state
        .log
        .iter()
        .rev()
        .find(|entry| entry.node == QualityValidator::ID)
        .and_then(|entry| entry.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}
