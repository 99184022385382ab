pub mod in_flight;
pub mod scheduler;
pub mod store;

pub use in_flight::{InFlight, InFlightGuard};
pub use scheduler::{CycleReport, IngestionScheduler};
pub use store::{ObservationStore, SqliteObservationStore, StoredObservation};
