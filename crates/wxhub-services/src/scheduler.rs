//! Periodic fetch-and-store of observations.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use wxhub_core::{DatabaseError, IngestError, LocationKey};
use wxhub_weather::{Observation, ObservationSource};

use crate::in_flight::InFlight;
use crate::store::ObservationStore;

/// Outcome counts of one ingestion cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub stored: usize,
    pub failed: usize,
}

/// Fetches each configured location and appends successful observations to
/// the store. Cloning shares the source, the store and the in-flight set.
#[derive(Clone)]
pub struct IngestionScheduler {
    source: Arc<dyn ObservationSource>,
    store: Arc<dyn ObservationStore>,
    in_flight: InFlight,
}

impl IngestionScheduler {
    pub fn new(source: Arc<dyn ObservationSource>, store: Arc<dyn ObservationStore>) -> Self {
        Self {
            source,
            store,
            in_flight: InFlight::new(),
        }
    }

    /// Fetch and store a single location now.
    ///
    /// Fails with [`IngestError::Busy`] if an attempt for the same location
    /// is already running.
    #[instrument(skip(self), fields(location = %location))]
    pub async fn ingest_one(&self, location: &LocationKey) -> Result<Observation, IngestError> {
        let _guard = self
            .in_flight
            .try_begin(location)
            .ok_or_else(|| IngestError::Busy(location.to_string()))?;

        let observation = self.source.fetch(location).await?;

        let store = self.store.clone();
        let to_store = observation.clone();
        tokio::task::spawn_blocking(move || store.append(&to_store))
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("store task failed: {}", e)))??;

        Ok(observation)
    }

    /// Run one cycle over `locations`, sequentially.
    ///
    /// Never fails: each location's error is logged and counted, and the
    /// cycle moves on to the next location.
    pub async fn run_cycle(&self, locations: &[LocationKey]) -> CycleReport {
        let mut report = CycleReport::default();

        for location in locations {
            report.attempted += 1;
            match self.ingest_one(location).await {
                Ok(obs) => {
                    report.stored += 1;
                    tracing::debug!(
                        "Stored observation for {}: max {:.1}, min {:.1}",
                        location,
                        obs.temperature_max,
                        obs.temperature_min
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Ingestion failed for {}: {}", location, e);
                }
            }
        }

        tracing::info!(
            "Ingestion cycle complete: {} attempted, {} stored, {} failed",
            report.attempted,
            report.stored,
            report.failed
        );
        report
    }

    /// Run a cycle every `period` until `cancel` fires.
    ///
    /// The first cycle starts one period after the call. A cycle that
    /// overruns delays the next tick instead of bursting.
    pub async fn run(self, locations: Vec<LocationKey>, period: Duration, cancel: CancellationToken) {
        tracing::info!(
            "Ingestion scheduler started: {} location(s) every {:?}",
            locations.len(),
            period
        );

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.run_cycle(&locations) => {}
                    }
                }
            }
        }

        tracing::info!("Ingestion scheduler stopped");
    }
}
