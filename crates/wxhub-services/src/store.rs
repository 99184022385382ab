//! SQLite-based observation storage.
//!
//! Rows land in `weather_data`, the table the forecasting service reads
//! its training window from.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;

use wxhub_core::{DatabaseError, RusqliteErrorExt};
use wxhub_weather::Observation;

/// Durable sink for observations.
///
/// Implementations block; async callers go through `spawn_blocking`.
pub trait ObservationStore: Send + Sync {
    fn append(&self, observation: &Observation) -> Result<(), DatabaseError>;
}

/// An observation as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObservation {
    pub id: i64,
    #[serde(flatten)]
    pub observation: Observation,
    pub created_at: DateTime<Utc>,
}

/// SQLite-based observation store.
pub struct SqliteObservationStore {
    conn: Mutex<Connection>,
}

impl SqliteObservationStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionFailed(format!("{}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| e.into_database_error())?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::info!("Observation store opened at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(|e| e.into_database_error())?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS weather_data (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    temperature_max REAL NOT NULL,
                    temperature_min REAL NOT NULL,
                    humidity REAL NOT NULL,
                    city TEXT NOT NULL,
                    country TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_weather_data_created ON weather_data(created_at);
                "#,
            )
            .map_err(|e| e.into_database_error())
    }

    /// Number of stored observations.
    pub fn count(&self) -> Result<u64, DatabaseError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM weather_data", [], |row| row.get(0))
            .map_err(|e| e.into_database_error())?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// The newest `limit` observations, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredObservation>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, temperature_max, temperature_min, humidity, city, country, created_at
                 FROM weather_data ORDER BY created_at DESC, id DESC LIMIT ?1",
            )
            .map_err(|e| e.into_database_error())?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], Self::row_to_stored)
            .map_err(|e| e.into_database_error())?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.into_database_error())?;
        Ok(rows)
    }

    fn row_to_stored(row: &rusqlite::Row) -> rusqlite::Result<StoredObservation> {
        let created_at_str: String = row.get(6)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(StoredObservation {
            id: row.get(0)?,
            observation: Observation {
                temperature_max: row.get(1)?,
                temperature_min: row.get(2)?,
                humidity: row.get(3)?,
                city: row.get(4)?,
                country: row.get(5)?,
            },
            created_at,
        })
    }
}

impl ObservationStore for SqliteObservationStore {
    fn append(&self, observation: &Observation) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO weather_data (temperature_max, temperature_min, humidity, city, country, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    observation.temperature_max,
                    observation.temperature_min,
                    observation.humidity,
                    observation.city,
                    observation.country,
                    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                ],
            )
            .map_err(|e| e.into_database_error())?;
        Ok(())
    }
}
