use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

use crate::metrics::global_metrics;

/// Record `api_requests_total{method,path,status}` and
/// `api_request_duration_seconds` for every request.
///
/// `path` is the matched route template, so unknown URLs collapse into a
/// single `unmatched` series.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let m = global_metrics();
    m.increment_counter(
        "api_requests_total",
        &[("method", &method), ("path", &path), ("status", &status)],
    );
    m.record_histogram("api_request_duration_seconds", start.elapsed().as_secs_f64());

    response
}
