use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use ft_bridge::http_api::{api_router, ApiState};
use ft_core::config::Config;
use ft_core::status::TrackerStatus;
use ft_core::store::{ObservationStore, SqliteStore};
use ft_findmy::{DeviceLocator, FindMyApi, ICloudClient, SessionHolder};

use crate::shutdown::ShutdownSignal;
use crate::tracker::{TickOutcome, Tracker};

/// Wires the session, locator, store, tracker loop and HTTP gateway together.
pub struct Daemon {
    config: Config,
    tracker: Arc<Tracker>,
    api_state: Arc<ApiState>,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Open the configured store, load the session artifact and validate it
    /// against iCloud. Any failure here is fatal for the process; a device
    /// that cannot be resolved yet is not.
    pub async fn new(config: Config) -> Result<Self> {
        let location = config.store_location().context("invalid DATABASE_URL")?;
        let store = SqliteStore::open(&location)
            .await
            .context("failed to open observation store")?;
        let api = ICloudClient::new().context("failed to build HTTP client")?;
        Self::with_components(config, Arc::new(api), Arc::new(store)).await
    }

    /// Same as [`new`](Self::new) with the remote service and store supplied.
    pub async fn with_components(
        config: Config,
        api: Arc<dyn FindMyApi>,
        store: Arc<dyn ObservationStore>,
    ) -> Result<Self> {
        let holder = Arc::new(SessionHolder::new(api));
        let (session, devices) = holder
            .load_with_devices(&config.session_file)
            .await
            .with_context(|| format!("failed to load session from {}", config.session_file.display()))?;
        info!(
            apple_id = %session.credentials().apple_id,
            generation = session.generation(),
            "session ready"
        );

        let locator = Arc::new(DeviceLocator::new(holder.clone(), config.device_selector.clone()));
        let status = Arc::new(TrackerStatus::new());
        match locator.resolve_from(&session, &devices).await {
            Ok(device) => status.set_last_device(device).await,
            Err(e) => warn!(
                error = %e,
                selector = %config.device_selector,
                "device not resolved at startup, the tracker will retry"
            ),
        }

        let tracker = Arc::new(Tracker::new(
            holder.clone(),
            locator.clone(),
            store.clone(),
            status.clone(),
            config.tracking_interval(),
        ));
        let api_state = Arc::new(ApiState::new(holder, locator, store, status));

        Ok(Self {
            config,
            tracker,
            api_state,
            shutdown: ShutdownSignal::new(),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn api_state(&self) -> &Arc<ApiState> {
        &self.api_state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One tick, no server.
    pub async fn run_once(&self) -> TickOutcome {
        self.tracker.tick().await
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(&self) -> Result<()> {
        let bind_addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        self.run_with_listener(listener).await
    }

    /// Run the tracker loop and serve the gateway on `listener` until
    /// shutdown. The server drains in-flight requests before returning.
    pub async fn run_with_listener(&self, listener: tokio::net::TcpListener) -> Result<()> {
        if self.config.api_key.is_none() {
            warn!("API_KEY not set; protected endpoints will refuse every request");
        }

        let router = api_router(self.api_state.clone(), self.config.api_key.clone());
        let bind_addr = listener.local_addr()?;
        info!(%bind_addr, "API server listening");

        let tracker = self.tracker.clone();
        let tracker_shutdown = self.shutdown.clone();
        let tracker_task = tokio::spawn(async move { tracker.run(tracker_shutdown).await });

        let server_shutdown = self.shutdown.clone();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.wait().await })
            .await;

        // The server only returns early on error; stop the loop either way.
        self.shutdown.trigger();
        tracker_task.await.context("tracker task panicked")?;
        served.context("API server error")?;

        info!("daemon stopped");
        Ok(())
    }
}
