/// Failures shared by the tracker loop, the store and the HTTP gateway.
///
/// The tracker swallows every variant at the tick boundary; the gateway maps
/// each one to a stable [`code`](TrackerError::code) and an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// The remote session is missing, rejected, or has expired. Terminal
    /// until the session artifact is regenerated and the process restarted.
    #[error("session expired: {0}")]
    AuthExpired(String),

    #[error("no device matches selector {selector:?}")]
    DeviceNotFound { selector: String },

    #[error("selector {selector:?} matches {matches} devices")]
    AmbiguousSelector { selector: String, matches: usize },

    /// Network or remote-service error expected to heal by the next tick.
    #[error("remote service unavailable: {0}")]
    RemoteTransient(String),

    /// A live remote action (play sound) was refused or failed.
    #[error("remote action failed: {0}")]
    RemoteActionFailed(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// No observation has been recorded yet.
    #[error("no observation recorded yet")]
    NotFound,
}

impl TrackerError {
    /// Stable machine-readable code used in API error bodies and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            TrackerError::AuthExpired(_) => "auth_expired",
            TrackerError::DeviceNotFound { .. } => "device_not_found",
            TrackerError::AmbiguousSelector { .. } => "ambiguous_selector",
            TrackerError::RemoteTransient(_) => "remote_unavailable",
            TrackerError::RemoteActionFailed(_) => "remote_action_failed",
            TrackerError::PersistenceFailure(_) => "persistence_failure",
            TrackerError::NotFound => "not_found",
        }
    }
}
