//! Request middleware.
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tower_http::cors::CorsLayer;

pub const TRACE_HEADER: &str = "x-trace-id";

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Echo an inbound trace id on the response.
pub async fn propagate_trace_id(req: Request<Body>, next: Next) -> Response {
    let trace_id = req.headers().get(TRACE_HEADER).cloned();
    let mut response = next.run(req).await;
    if let Some(value) = trace_id {
        response.headers_mut().entry(TRACE_HEADER).or_insert(value);
    }
    response
}
