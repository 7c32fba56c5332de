use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ft_core::error::TrackerError;
use ft_core::status::TrackerStatus;
use ft_core::store::ObservationStore;
use ft_core::types::{Device, Observation, StoredObservation};
use ft_daemon::shutdown::ShutdownSignal;
use ft_daemon::tracker::{TickOutcome, Tracker};
use ft_findmy::fake::{self, phone, FakeFailure, FakeFindMy};
use ft_findmy::{DeviceLocator, SessionHolder, SessionState};

// ---------------------------------------------------------------------------
// Test stores
// ---------------------------------------------------------------------------

/// Vec-backed store with an optional per-append delay on the tokio clock.
#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<StoredObservation>>,
    append_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    fn slow(delay: Duration) -> Self {
        Self {
            append_delay: Some(delay),
            ..Self::default()
        }
    }

    fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn append(&self, observation: &Observation) -> Result<i64, TrackerError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        let id = {
            let mut rows = self.rows.lock().unwrap();
            let id = rows.len() as i64 + 1;
            rows.push(StoredObservation {
                id,
                observation: observation.clone(),
            });
            id
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn latest(&self, device_id: &str) -> Result<StoredObservation, TrackerError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.observation.device_id == device_id)
            .cloned()
            .ok_or(TrackerError::NotFound)
    }

    async fn history(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredObservation>, TrackerError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.observation.device_id == device_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, device_id: &str) -> Result<u64, TrackerError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.observation.device_id == device_id)
            .count() as u64)
    }

    async fn devices(&self) -> Result<Vec<Device>, TrackerError> {
        let rows = self.rows.lock().unwrap();
        let mut seen: Vec<Device> = Vec::new();
        for row in rows.iter().rev() {
            if !seen.iter().any(|d| d.device_id == row.observation.device_id) {
                seen.push(row.observation.device());
            }
        }
        Ok(seen)
    }
}

struct BrokenStore;

#[async_trait]
impl ObservationStore for BrokenStore {
    async fn append(&self, _: &Observation) -> Result<i64, TrackerError> {
        Err(TrackerError::PersistenceFailure("disk full".into()))
    }
    async fn latest(&self, _: &str) -> Result<StoredObservation, TrackerError> {
        Err(TrackerError::NotFound)
    }
    async fn history(&self, _: &str, _: usize) -> Result<Vec<StoredObservation>, TrackerError> {
        Ok(Vec::new())
    }
    async fn count(&self, _: &str) -> Result<u64, TrackerError> {
        Ok(0)
    }
    async fn devices(&self) -> Result<Vec<Device>, TrackerError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

struct Rig {
    fake: Arc<FakeFindMy>,
    holder: Arc<SessionHolder>,
    status: Arc<TrackerStatus>,
    tracker: Arc<Tracker>,
}

async fn rig(store: Arc<dyn ObservationStore>, interval: Duration) -> Rig {
    let fake = Arc::new(FakeFindMy::new(vec![
        phone("watch", "Watch", "Apple Watch Series 9", 0.0, 0.0),
        phone("pro", "Work Phone", "iPhone 16 Pro", 37.7749, -122.4194),
    ]));
    let holder = Arc::new(SessionHolder::new(fake.clone()));
    holder.install(fake::credentials()).await.unwrap();
    let locator = Arc::new(DeviceLocator::new(holder.clone(), "iPhone 16 Pro"));
    let status = Arc::new(TrackerStatus::new());
    let tracker = Arc::new(Tracker::new(
        holder.clone(),
        locator,
        store,
        status.clone(),
        interval,
    ));
    Rig {
        fake,
        holder,
        status,
        tracker,
    }
}

// ---------------------------------------------------------------------------
// Single ticks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tick_records_observation() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig(store.clone(), Duration::from_secs(300)).await;

    let outcome = rig.tracker.tick().await;
    let TickOutcome::Recorded(stored) = outcome else {
        panic!("expected a recorded tick, got {outcome:?}");
    };
    assert_eq!(stored.observation.device_id, "pro");
    assert_eq!(
        stored.observation.location.as_ref().unwrap().coordinates,
        [-122.4194, 37.7749]
    );
    assert!(stored.observation.coordinates_consistent());

    assert_eq!(store.len(), 1);
    assert_eq!(rig.status.last_device().await.unwrap().device_id, "pro");
    assert_eq!(
        rig.status.last_success().await,
        Some(stored.observation.timestamp)
    );
}

#[tokio::test]
async fn expired_session_ticks_are_noops() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig(store.clone(), Duration::from_secs(300)).await;
    rig.holder.mark_expired(1).await;
    let calls = rig.fake.list_calls();

    for _ in 0..3 {
        let outcome = rig.tracker.tick().await;
        assert_eq!(outcome.label(), "auth_expired");
    }
    assert_eq!(store.len(), 0);
    assert_eq!(rig.fake.list_calls(), calls);
}

#[tokio::test]
async fn remote_rejection_expires_then_stops_calling() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig(store.clone(), Duration::from_secs(300)).await;
    assert!(rig.tracker.tick().await.is_recorded());

    rig.fake.fail_list(Some(FakeFailure::Unauthorized));
    assert_eq!(rig.tracker.tick().await.label(), "auth_expired");
    assert_eq!(rig.holder.state().await, SessionState::Expired);

    let calls = rig.fake.list_calls();
    rig.fake.fail_list(None);
    assert_eq!(rig.tracker.tick().await.label(), "auth_expired");
    assert_eq!(rig.fake.list_calls(), calls);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn missing_device_is_skipped_until_it_returns() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig(store.clone(), Duration::from_secs(300)).await;
    rig.fake
        .set_devices(vec![phone("watch", "Watch", "Apple Watch", 0.0, 0.0)]);

    assert_eq!(rig.tracker.tick().await.label(), "device_not_found");
    assert_eq!(store.len(), 0);

    rig.fake.set_devices(vec![phone("pro", "Work Phone", "iPhone 16 Pro", 1.0, 2.0)]);
    assert!(rig.tracker.tick().await.is_recorded());
}

#[tokio::test]
async fn transient_failure_is_skipped() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig(store.clone(), Duration::from_secs(300)).await;

    rig.fake.fail_list(Some(FakeFailure::Unavailable));
    assert_eq!(rig.tracker.tick().await.label(), "remote_unavailable");
    assert_eq!(rig.holder.state().await, SessionState::Authenticated);

    rig.fake.fail_list(None);
    assert!(rig.tracker.tick().await.is_recorded());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn persistence_failure_is_skipped() {
    let rig = rig(Arc::new(BrokenStore), Duration::from_secs(300)).await;
    let outcome = rig.tracker.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Skipped(TrackerError::PersistenceFailure("disk full".into()))
    );
    assert!(rig.status.last_success().await.is_none());
}

#[tokio::test]
async fn timestamps_never_decrease() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig(store.clone(), Duration::from_secs(300)).await;
    for i in 0..20 {
        rig.fake.move_device("pro", i as f64, i as f64);
        assert!(rig.tracker.tick().await.is_recorded());
    }

    let history = store.history("pro", 100).await.unwrap();
    assert_eq!(history.len(), 20);
    for pair in history.windows(2) {
        assert!(pair[0].observation.timestamp >= pair[1].observation.timestamp);
    }
    assert_eq!(
        store.latest("pro").await.unwrap().observation.location_data.unwrap().latitude,
        19.0
    );
}

// ---------------------------------------------------------------------------
// Scheduling (paused clock)
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn interval_bounds_observation_count() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig(store.clone(), Duration::from_secs(10)).await;
    let shutdown = ShutdownSignal::new();

    let handle = {
        let tracker = rig.tracker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { tracker.run(shutdown).await })
    };

    // I = 10s, T = 95s: between floor(T/I) - 1 = 8 and ceil(T/I) = 10.
    tokio::time::sleep(Duration::from_secs(95)).await;
    shutdown.trigger();
    handle.await.unwrap();

    let n = store.len();
    assert!((8..=10).contains(&n), "recorded {n} observations");
}

#[tokio::test(start_paused = true)]
async fn slow_ticks_delay_instead_of_overlapping() {
    let store = Arc::new(MemoryStore::slow(Duration::from_secs(25)));
    let rig = rig(store.clone(), Duration::from_secs(10)).await;
    let shutdown = ShutdownSignal::new();

    let handle = {
        let tracker = rig.tracker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { tracker.run(shutdown).await })
    };

    tokio::time::sleep(Duration::from_secs(95)).await;
    shutdown.trigger();
    handle.await.unwrap();

    assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
    let n = store.len();
    assert!((3..=4).contains(&n), "recorded {n} observations");
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_loop_and_clears_active_flag() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig(store.clone(), Duration::from_secs(60)).await;
    let shutdown = ShutdownSignal::new();

    let handle = {
        let tracker = rig.tracker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { tracker.run(shutdown).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(rig.status.is_active());
    assert_eq!(store.len(), 1);

    shutdown.trigger();
    handle.await.unwrap();
    assert!(!rig.status.is_active());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(store.len(), 1);
}
