use std::path::Path;

use async_trait::async_trait;
use chrono::SecondsFormat;
use tokio_rusqlite::Connection;

use crate::config::StoreLocation;
use crate::error::TrackerError;
use crate::types::{Device, Observation, StoredObservation};

/// Append-only persistence for observations.
///
/// Records are never updated or deleted. Only the tracker writes, so
/// per-device records arrive in non-decreasing timestamp order.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Persist one observation atomically, returning its store-assigned id.
    async fn append(&self, observation: &Observation) -> Result<i64, TrackerError>;

    /// The most recently inserted observation for `device_id`.
    async fn latest(&self, device_id: &str) -> Result<StoredObservation, TrackerError>;

    /// Up to `limit` observations for `device_id`, newest first.
    async fn history(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredObservation>, TrackerError>;

    /// Number of observations stored for `device_id`.
    async fn count(&self, device_id: &str) -> Result<u64, TrackerError>;

    /// Every device with at least one observation, as last recorded,
    /// most recently written first.
    async fn devices(&self) -> Result<Vec<Device>, TrackerError>;
}

fn persistence(err: impl std::fmt::Display) -> TrackerError {
    TrackerError::PersistenceFailure(err.to_string())
}

fn decode(id: i64, document: &str) -> Result<StoredObservation, TrackerError> {
    let observation: Observation = serde_json::from_str(document)
        .map_err(|e| persistence(format!("corrupt observation {id}: {e}")))?;
    Ok(StoredObservation { id, observation })
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Async SQLite-backed observation store.
///
/// Each observation is kept as its full JSON document, with the device id,
/// timestamp and coordinate pair lifted into indexed columns.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store described by a parsed connection string.
    pub async fn open(location: &StoreLocation) -> Result<Self, tokio_rusqlite::Error> {
        match location {
            StoreLocation::File(path) => Self::new(path).await,
            StoreLocation::Memory => Self::new_in_memory().await,
        }
    }

    /// Open (or create) a database at the given file path.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, tokio_rusqlite::Error> {
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create a purely in-memory database (useful for tests).
    pub async fn new_in_memory() -> Result<Self, tokio_rusqlite::Error> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS observations (
                        id          INTEGER PRIMARY KEY AUTOINCREMENT,
                        device_id   TEXT NOT NULL,
                        timestamp   TEXT NOT NULL,
                        longitude   REAL,
                        latitude    REAL,
                        document    TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_observations_device
                        ON observations(device_id, id);
                    CREATE INDEX IF NOT EXISTS idx_observations_geo
                        ON observations(longitude, latitude);
                    ",
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl ObservationStore for SqliteStore {
    async fn append(&self, observation: &Observation) -> Result<i64, TrackerError> {
        let document = serde_json::to_string(observation).map_err(persistence)?;
        let device_id = observation.device_id.clone();
        let timestamp = observation
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let longitude = observation.location.as_ref().map(|p| p.longitude());
        let latitude = observation.location.as_ref().map(|p| p.latitude());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO observations (device_id, timestamp, longitude, latitude, document)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![device_id, timestamp, longitude, latitude, document],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(persistence)
    }

    async fn latest(&self, device_id: &str) -> Result<StoredObservation, TrackerError> {
        let device_id = device_id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, document FROM observations
                     WHERE device_id = ?1 ORDER BY id DESC LIMIT 1",
                )?;
                let mut rows = stmt.query(rusqlite::params![device_id])?;
                let found = match rows.next()? {
                    Some(row) => Some((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                    None => None,
                };
                Ok(found)
            })
            .await
            .map_err(persistence)?;

        match row {
            Some((id, document)) => decode(id, &document),
            None => Err(TrackerError::NotFound),
        }
    }

    async fn history(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredObservation>, TrackerError> {
        let device_id = device_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, document FROM observations
                     WHERE device_id = ?1 ORDER BY id DESC LIMIT ?2",
                )?;
                let mut rows = stmt.query(rusqlite::params![device_id, limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push((row.get::<_, i64>(0)?, row.get::<_, String>(1)?));
                }
                Ok(out)
            })
            .await
            .map_err(persistence)?;

        rows.iter().map(|(id, doc)| decode(*id, doc)).collect()
    }

    async fn count(&self, device_id: &str) -> Result<u64, TrackerError> {
        let device_id = device_id.to_string();
        let count = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM observations WHERE device_id = ?1",
                    rusqlite::params![device_id],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .map_err(persistence)?;
        Ok(count.max(0) as u64)
    }

    async fn devices(&self) -> Result<Vec<Device>, TrackerError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, document FROM observations
                     WHERE id IN (SELECT MAX(id) FROM observations GROUP BY device_id)
                     ORDER BY id DESC",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push((row.get::<_, i64>(0)?, row.get::<_, String>(1)?));
                }
                Ok(out)
            })
            .await
            .map_err(persistence)?;

        rows.iter()
            .map(|(id, doc)| decode(*id, doc).map(|stored| stored.observation.device()))
            .collect()
    }
}
