//! Observability for the findmy tracker services.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Metrics**: process-wide counters, gauges and histograms with
//!   Prometheus text export
//! - **Middleware**: axum layers for per-request metrics and request ids

pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod tracing_setup;
