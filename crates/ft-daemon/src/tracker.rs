use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use ft_core::error::TrackerError;
use ft_core::status::TrackerStatus;
use ft_core::store::ObservationStore;
use ft_core::types::StoredObservation;
use ft_findmy::{DeviceLocator, SessionHolder};
use ft_telemetry::metrics::global_metrics;

use crate::shutdown::ShutdownSignal;

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Recorded(StoredObservation),
    Skipped(TrackerError),
}

impl TickOutcome {
    /// Metrics label: `recorded` or the error code.
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::Recorded(_) => "recorded",
            TickOutcome::Skipped(e) => e.code(),
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, TickOutcome::Recorded(_))
    }
}

/// Polls the remote service on a fixed cadence and appends one observation
/// per successful tick.
///
/// Ticks never overlap and never end the loop; a failed tick is logged and
/// the next tick is the retry.
pub struct Tracker {
    holder: Arc<SessionHolder>,
    locator: Arc<DeviceLocator>,
    store: Arc<dyn ObservationStore>,
    status: Arc<TrackerStatus>,
    interval: Duration,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl Tracker {
    pub fn new(
        holder: Arc<SessionHolder>,
        locator: Arc<DeviceLocator>,
        store: Arc<dyn ObservationStore>,
        status: Arc<TrackerStatus>,
        interval: Duration,
    ) -> Self {
        Self {
            holder,
            locator,
            store,
            status,
            interval,
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run ticks until `shutdown` fires. The first tick is immediate.
    ///
    /// Shutdown is observed between ticks only.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = shutdown.subscribe();

        self.set_active(true);
        info!(
            interval_secs = self.interval.as_secs(),
            selector = %self.locator.selector(),
            "tracker started"
        );

        while !shutdown.is_shutting_down() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        self.set_active(false);
        info!("tracker stopped");
    }

    /// Execute exactly one tick and report what happened.
    pub async fn tick(&self) -> TickOutcome {
        let started = Instant::now();
        let outcome = match self.collect().await {
            Ok(stored) => TickOutcome::Recorded(stored),
            Err(e) => TickOutcome::Skipped(e),
        };

        let metrics = global_metrics();
        metrics.increment_counter("tracker_ticks_total", &[("outcome", outcome.label())]);
        metrics.record_histogram(
            "tracker_tick_duration_seconds",
            started.elapsed().as_secs_f64(),
        );

        match &outcome {
            TickOutcome::Recorded(stored) => {
                let obs = &stored.observation;
                match &obs.location_data {
                    Some(loc) => info!(
                        id = stored.id,
                        device_id = %obs.device_id,
                        latitude = loc.latitude,
                        longitude = loc.longitude,
                        accuracy = ?loc.accuracy,
                        is_old = loc.is_old,
                        battery = ?obs.battery_level,
                        "observation recorded"
                    ),
                    None => info!(
                        id = stored.id,
                        device_id = %obs.device_id,
                        battery = ?obs.battery_level,
                        "observation recorded without location"
                    ),
                }
            }
            TickOutcome::Skipped(e @ TrackerError::AuthExpired(_)) => {
                error!(error = %e, "tick skipped: session expired, regenerate the session file")
            }
            TickOutcome::Skipped(e @ TrackerError::PersistenceFailure(_)) => {
                error!(error = %e, "tick skipped: observation not stored")
            }
            TickOutcome::Skipped(e) => warn!(error = %e, code = e.code(), "tick skipped"),
        }

        outcome
    }

    async fn collect(&self) -> Result<StoredObservation, TrackerError> {
        let session = self.holder.get().await?;
        let remote = self.locator.locate(&session).await?;
        let device = remote.identity();
        self.status.set_last_device(device).await;

        let timestamp = self.next_timestamp().await;
        let observation = remote.to_observation(timestamp);
        let id = self.store.append(&observation).await?;
        self.status.record_success(timestamp).await;

        Ok(StoredObservation { id, observation })
    }

    /// Wall-clock now, held back to never precede the previous observation.
    async fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_timestamp.lock().await;
        let now = Utc::now();
        let ts = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(ts);
        ts
    }

    fn set_active(&self, active: bool) {
        self.status.set_active(active);
        global_metrics().set_gauge("tracking_active", i64::from(active));
    }
}
