//! Per-location ingestion state (Idle / Fetching).
//!
//! Ensures at most one attempt per location runs at a time, whether it was
//! started by the timer or by an on-demand request.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use wxhub_core::LocationKey;

/// Set of locations currently being fetched. Cloning shares the set.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<Mutex<HashSet<LocationKey>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `location` from Idle to Fetching.
    ///
    /// Returns `None` if it is already Fetching. The location returns to Idle
    /// when the guard is dropped.
    pub fn try_begin(&self, location: &LocationKey) -> Option<InFlightGuard> {
        if self.busy.lock().insert(location.clone()) {
            Some(InFlightGuard {
                busy: self.busy.clone(),
                location: location.clone(),
            })
        } else {
            None
        }
    }
}

/// Marks one location as Fetching for as long as it lives.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<Mutex<HashSet<LocationKey>>>,
    location: LocationKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.location);
    }
}
