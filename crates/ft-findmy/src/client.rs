use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, ORIGIN};
use serde_json::json;

use crate::credentials::Credentials;
use crate::error::{RemoteError, Result};
use crate::types::{RefreshClientResponse, RemoteDevice};

pub const ICLOUD_ORIGIN: &str = "https://www.icloud.com";

/// Remote operations the tracker needs from the Find My service.
#[async_trait]
pub trait FindMyApi: Send + Sync {
    /// Every device on the account, with its latest known location.
    async fn list_devices(&self, credentials: &Credentials) -> Result<Vec<RemoteDevice>>;

    /// Ask `device_id` to play its alert sound.
    async fn play_sound(
        &self,
        credentials: &Credentials,
        device_id: &str,
        subject: &str,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// ICloudClient
// ---------------------------------------------------------------------------

/// `FindMyApi` over the iCloud `fmipservice` web endpoints.
///
/// Stateless apart from the connection pool; the session cookies travel with
/// every call.
#[derive(Debug, Clone)]
pub struct ICloudClient {
    client: reqwest::Client,
}

impl ICloudClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("findmy-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn api_post(
        &self,
        credentials: &Credentials,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let url = format!(
            "{}/fmipservice/client/web/{endpoint}",
            credentials.base_url()
        );
        let resp = self
            .client
            .post(&url)
            .query(&[("dsid", credentials.dsid.as_str())])
            .header(COOKIE, credentials.cookies.as_str())
            .header(ORIGIN, ICLOUD_ORIGIN)
            .header(CONTENT_TYPE, "text/plain")
            .body(body.to_string())
            .send()
            .await?;

        let status = resp.status();
        if RemoteError::is_auth_status(status.as_u16()) {
            return Err(RemoteError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl FindMyApi for ICloudClient {
    async fn list_devices(&self, credentials: &Credentials) -> Result<Vec<RemoteDevice>> {
        let body = json!({
            "clientContext": {
                "fmly": true,
                "shouldLocate": true,
                "selectedDevice": "all",
            }
        });
        let resp = self.api_post(credentials, "refreshClient", &body).await?;
        let bytes = resp.bytes().await?;
        let parsed: RefreshClientResponse = serde_json::from_slice(&bytes)?;
        tracing::debug!(devices = parsed.content.len(), "refreshClient");
        Ok(parsed.content)
    }

    async fn play_sound(
        &self,
        credentials: &Credentials,
        device_id: &str,
        subject: &str,
    ) -> Result<()> {
        let body = json!({
            "device": device_id,
            "subject": subject,
            "clientContext": { "fmly": true },
        });
        self.api_post(credentials, "playSound", &body).await?;
        tracing::debug!(device_id, "playSound accepted");
        Ok(())
    }
}
