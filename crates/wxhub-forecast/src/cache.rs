//! In-memory cell holding the most recently retrieved latest forecast.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::types::ForecastPoint;

/// A cached latest point with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedForecast {
    pub forecast: ForecastPoint,
    pub retrieved_at: DateTime<Utc>,
    /// True when the point was taken from the tail of the full series
    /// because the latest-point shortcut failed.
    pub derived: bool,
}

/// Process-wide latest forecast. Overwritten on every successful retrieval,
/// never persisted.
#[derive(Debug, Default)]
pub struct LatestSnapshot {
    inner: RwLock<Option<CachedForecast>>,
}

impl LatestSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, forecast: ForecastPoint, derived: bool) {
        *self.inner.write() = Some(CachedForecast {
            forecast,
            retrieved_at: Utc::now(),
            derived,
        });
    }

    pub fn get(&self) -> Option<CachedForecast> {
        self.inner.read().clone()
    }
}
