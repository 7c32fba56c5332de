use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ft_core::error::TrackerError;
use serde_json::json;
use thiserror::Error;

/// Everything a gateway request can fail with.
///
/// Rendered as `{"error": <code>, "message": <text>}` with a status chosen
/// per variant.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key required")]
    MissingApiKey,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("API key not configured on server")]
    ApiKeyNotConfigured,

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingApiKey => "missing_api_key",
            ApiError::InvalidApiKey => "invalid_api_key",
            ApiError::ApiKeyNotConfigured => "api_key_not_configured",
            ApiError::Tracker(e) => e.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingApiKey => StatusCode::UNAUTHORIZED,
            ApiError::InvalidApiKey => StatusCode::FORBIDDEN,
            ApiError::ApiKeyNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Tracker(e) => match e {
                TrackerError::AuthExpired(_) => StatusCode::SERVICE_UNAVAILABLE,
                TrackerError::DeviceNotFound { .. } | TrackerError::NotFound => {
                    StatusCode::NOT_FOUND
                }
                TrackerError::AmbiguousSelector { .. } => StatusCode::CONFLICT,
                TrackerError::RemoteTransient(_) | TrackerError::RemoteActionFailed(_) => {
                    StatusCode::BAD_GATEWAY
                }
                TrackerError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Tracker(TrackerError::NotFound) => "no data yet".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
            "message": self.message(),
        }));
        (self.status(), body).into_response()
    }
}
