use thiserror::Error;

/// Failures talking to the Find My web service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The service rejected the session cookies.
    #[error("session rejected by remote service (HTTP {0})")]
    Unauthorized(u16),

    /// Any other non-success response.
    #[error("remote service error {status}: {body}")]
    Api { status: u16, body: String },

    /// Transport failure: DNS, connect, TLS, reset.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteError {
    /// iCloud answers 401/403 for stale cookies and 421/450 when the
    /// partition wants a fresh login.
    pub fn is_auth_status(status: u16) -> bool {
        matches!(status, 401 | 403 | 421 | 450)
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
