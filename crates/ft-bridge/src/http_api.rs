use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ft_core::error::TrackerError;
use ft_core::status::TrackerStatus;
use ft_core::store::ObservationStore;
use ft_core::types::{Device, StatusView, StoredObservation};
use ft_findmy::locator::select_device;
use ft_findmy::{DeviceLocator, SessionHolder, SessionState};
use ft_telemetry::metrics::global_metrics;
use ft_telemetry::middleware::metrics_middleware;
use ft_telemetry::tracing_setup::request_id_middleware;

use crate::auth::AuthLayer;
use crate::error::ApiError;

pub const SERVICE_NAME: &str = "findmy-tracker";

/// Subject line shown on the device when the alarm plays.
pub const ALARM_SUBJECT: &str = "Find My iPhone Alert";

/// Shared state for every handler.
pub struct ApiState {
    pub holder: Arc<SessionHolder>,
    pub locator: Arc<DeviceLocator>,
    pub store: Arc<dyn ObservationStore>,
    pub tracker: Arc<TrackerStatus>,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(
        holder: Arc<SessionHolder>,
        locator: Arc<DeviceLocator>,
        store: Arc<dyn ObservationStore>,
        tracker: Arc<TrackerStatus>,
    ) -> Self {
        Self {
            holder,
            locator,
            store,
            tracker,
            start_time: Instant::now(),
        }
    }
}

/// Build the gateway router.
///
/// `/` is public; everything else sits behind [`AuthLayer`].
pub fn api_router(state: Arc<ApiState>, api_key: Option<String>) -> Router {
    let protected = Router::new()
        .route("/location", get(get_location))
        .route("/status", get(get_status))
        .route("/alarm", post(trigger_alarm))
        .route("/metrics", get(get_metrics))
        .route_layer(AuthLayer::new(api_key));

    Router::new()
        .route("/", get(health))
        .merge(protected)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    tracking_active: bool,
    device: String,
    resolved_device: Option<Device>,
    session: SessionState,
    last_success: Option<DateTime<Utc>>,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct AlarmResponse {
    status: &'static str,
    message: String,
    timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        tracking_active: state.tracker.is_active(),
        device: state.locator.selector().to_string(),
        resolved_device: state.tracker.last_device().await,
        session: state.holder.state().await,
        last_success: state.tracker.last_success().await,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Device id of the tracked device without touching the network.
///
/// Falls back to the devices already in the store so history recorded by an
/// earlier run stays readable before the first successful tick.
async fn known_device_id(state: &ApiState) -> Result<String, ApiError> {
    if let Some(device) = state.tracker.last_device().await {
        return Ok(device.device_id);
    }
    if let Some(device) = state.locator.cached().await {
        return Ok(device.device_id);
    }
    let recorded = state.store.devices().await?;
    match select_device(&recorded, state.locator.selector()) {
        Ok(device) => Ok(device.device_id.clone()),
        Err(_) => Err(TrackerError::NotFound.into()),
    }
}

async fn latest(state: &ApiState) -> Result<StoredObservation, ApiError> {
    let device_id = known_device_id(state).await?;
    Ok(state.store.latest(&device_id).await?)
}

async fn get_location(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<StoredObservation>, ApiError> {
    latest(&state).await.map(Json)
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Result<Json<StatusView>, ApiError> {
    let stored = latest(&state).await?;
    Ok(Json(StatusView::from(&stored.observation)))
}

async fn trigger_alarm(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<AlarmResponse>, ApiError> {
    let result = async {
        let session = state.holder.get().await?;
        let device = state.locator.locate(&session).await?.identity();
        state
            .holder
            .play_sound(&session, &device.device_id, ALARM_SUBJECT)
            .await?;
        Ok::<_, TrackerError>(device)
    }
    .await;

    let metrics = global_metrics();
    match result {
        Ok(device) => {
            metrics.increment_counter("alarm_requests_total", &[("outcome", "success")]);
            info!(device_id = %device.device_id, name = %device.name, "alarm triggered");
            Ok(Json(AlarmResponse {
                status: "success",
                message: format!("Alarm triggered on {}", device.name),
                timestamp: Utc::now(),
            }))
        }
        Err(e) => {
            metrics.increment_counter("alarm_requests_total", &[("outcome", e.code())]);
            warn!(error = %e, code = e.code(), "alarm failed");
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    format: Option<String>,
}

/// Prometheus text by default, `?format=json` for a JSON object.
async fn get_metrics(Query(query): Query<MetricsQuery>) -> Response {
    let metrics = global_metrics();
    match query.format.as_deref() {
        Some("json") => Json(metrics.render_json()).into_response(),
        _ => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.render_prometheus(),
        )
            .into_response(),
    }
}
