use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ft_core::error::TrackerError;
use ft_core::types::Device;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::FindMyApi;
use crate::credentials::Credentials;
use crate::error::RemoteError;
use crate::types::RemoteDevice;

/// Lifecycle of the process-wide session. `Expired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Authenticated,
    Expired,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Authenticated => "authenticated",
            SessionState::Expired => "expired",
        })
    }
}

/// Read-only handle on the authenticated session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Session {
    credentials: Arc<Credentials>,
    generation: u64,
    validated_at: DateTime<Utc>,
}

impl Session {
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Artifact creation time, when the login flow recorded one.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.credentials.created_at
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    session: Option<Session>,
    generation: u64,
    device: Option<(u64, Device)>,
}

/// Owns the remote session and every transition of its state.
///
/// The lock guards state reads and transitions only; remote calls run with
/// it released. The resolved-device cache lives under the same lock so it
/// is dropped atomically with the session it belongs to.
pub struct SessionHolder {
    api: Arc<dyn FindMyApi>,
    inner: Mutex<Inner>,
}

impl SessionHolder {
    pub fn new(api: Arc<dyn FindMyApi>) -> Self {
        Self {
            api,
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                session: None,
                generation: 0,
                device: None,
            }),
        }
    }

    /// Read the session artifact at `path` and validate it remotely.
    pub async fn load(&self, path: &Path) -> Result<Session, TrackerError> {
        self.load_with_devices(path).await.map(|(session, _)| session)
    }

    /// [`load`](Self::load), also handing back the device list fetched
    /// during validation.
    pub async fn load_with_devices(
        &self,
        path: &Path,
    ) -> Result<(Session, Vec<RemoteDevice>), TrackerError> {
        self.ensure_uninitialized().await?;
        match Credentials::load(path).await {
            Ok(credentials) => self.install_with_devices(credentials).await,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "session artifact unusable");
                self.inner.lock().await.state = SessionState::Expired;
                Err(TrackerError::AuthExpired(e.to_string()))
            }
        }
    }

    /// Validate already-parsed credentials with one device-list call and
    /// make them the current session.
    pub async fn install(&self, credentials: Credentials) -> Result<Session, TrackerError> {
        self.install_with_devices(credentials)
            .await
            .map(|(session, _)| session)
    }

    async fn install_with_devices(
        &self,
        credentials: Credentials,
    ) -> Result<(Session, Vec<RemoteDevice>), TrackerError> {
        self.ensure_uninitialized().await?;

        let devices = match self.api.list_devices(&credentials).await {
            Ok(devices) => devices,
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "session rejected during validation");
                self.inner.lock().await.state = SessionState::Expired;
                return Err(TrackerError::AuthExpired(e.to_string()));
            }
            Err(e) => return Err(TrackerError::RemoteTransient(e.to_string())),
        };

        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Uninitialized {
            return Err(already_initialised());
        }
        inner.generation += 1;
        let session = Session {
            credentials: Arc::new(credentials),
            generation: inner.generation,
            validated_at: Utc::now(),
        };
        inner.session = Some(session.clone());
        inner.state = SessionState::Authenticated;
        info!(
            generation = session.generation,
            devices = devices.len(),
            "session authenticated"
        );
        Ok((session, devices))
    }

    async fn ensure_uninitialized(&self) -> Result<(), TrackerError> {
        if self.inner.lock().await.state == SessionState::Uninitialized {
            Ok(())
        } else {
            Err(already_initialised())
        }
    }

    /// The current session, or `AuthExpired` unless authenticated.
    pub async fn get(&self) -> Result<Session, TrackerError> {
        let inner = self.inner.lock().await;
        match (&inner.state, &inner.session) {
            (SessionState::Authenticated, Some(session)) => Ok(session.clone()),
            (SessionState::Uninitialized, _) => {
                Err(TrackerError::AuthExpired("session not loaded".into()))
            }
            _ => Err(TrackerError::AuthExpired(
                "session expired; regenerate the session file and restart".into(),
            )),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Expire the session of `generation`, if it is still the current one.
    pub async fn mark_expired(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Authenticated && inner.generation == generation {
            inner.state = SessionState::Expired;
            inner.session = None;
            inner.device = None;
            warn!(generation, "session expired");
        }
    }

    // -- remote calls -------------------------------------------------------

    /// List the account's devices. Auth failures expire the session.
    pub async fn list_devices(&self, session: &Session) -> Result<Vec<RemoteDevice>, TrackerError> {
        match self.api.list_devices(session.credentials()).await {
            Ok(devices) => Ok(devices),
            Err(e) => Err(self.map_remote(session, e, false).await),
        }
    }

    /// Trigger the alert sound on `device_id`.
    pub async fn play_sound(
        &self,
        session: &Session,
        device_id: &str,
        subject: &str,
    ) -> Result<(), TrackerError> {
        match self
            .api
            .play_sound(session.credentials(), device_id, subject)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.map_remote(session, e, true).await),
        }
    }

    async fn map_remote(&self, session: &Session, err: RemoteError, action: bool) -> TrackerError {
        match err {
            e if e.is_auth_failure() => {
                self.mark_expired(session.generation).await;
                TrackerError::AuthExpired(e.to_string())
            }
            e @ RemoteError::Http(_) => TrackerError::RemoteTransient(e.to_string()),
            e if action => TrackerError::RemoteActionFailed(e.to_string()),
            e => TrackerError::RemoteTransient(e.to_string()),
        }
    }

    // -- resolved device cache ----------------------------------------------

    /// Cached device for `generation`, if that session is still current.
    pub async fn cached_device(&self, generation: u64) -> Option<Device> {
        let inner = self.inner.lock().await;
        match &inner.device {
            Some((g, device))
                if *g == generation && inner.state == SessionState::Authenticated =>
            {
                Some(device.clone())
            }
            _ => None,
        }
    }

    /// Cached device for whatever session is current.
    pub async fn current_device(&self) -> Option<Device> {
        let inner = self.inner.lock().await;
        if inner.state != SessionState::Authenticated {
            return None;
        }
        inner.device.as_ref().map(|(_, device)| device.clone())
    }

    /// Remember `device` for `generation`. Ignored if that session is gone.
    pub async fn cache_device(&self, generation: u64, device: Device) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Authenticated && inner.generation == generation {
            inner.device = Some((generation, device));
        }
    }

    pub async fn clear_device(&self) {
        self.inner.lock().await.device = None;
    }
}

fn already_initialised() -> TrackerError {
    TrackerError::AuthExpired("session already initialised; restart the process to reload".into())
}
