use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("cannot read session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed session file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid session file: {0}")]
    Invalid(String),
}

/// Session artifact written by the interactive login flow.
///
/// Cookie material is wiped from memory on drop and never printed.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub apple_id: String,
    pub dsid: String,
    pub service_url: String,
    pub cookies: String,
    #[zeroize(skip)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Read and validate an artifact from disk.
    pub async fn load(path: &Path) -> Result<Self, CredentialsError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CredentialsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CredentialsError> {
        let creds: Credentials = serde_json::from_str(raw)?;
        creds.validate()?;
        Ok(creds)
    }

    fn validate(&self) -> Result<(), CredentialsError> {
        if self.dsid.trim().is_empty() {
            return Err(CredentialsError::Invalid("dsid is empty".into()));
        }
        if self.cookies.trim().is_empty() {
            return Err(CredentialsError::Invalid("cookies are empty".into()));
        }
        let url = self.service_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(CredentialsError::Invalid(format!(
                "service_url must be an http(s) URL, got {url:?}"
            )));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.service_url.trim().trim_end_matches('/')
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("apple_id", &self.apple_id)
            .field("dsid", &self.dsid)
            .field("service_url", &self.service_url)
            .field("cookies", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}
