//! Current-conditions ingestion for wxhub.
//!
//! Fetches a single observation per (city, country) from the external weather
//! provider and validates it strictly before handing it on.

pub mod provider;
pub mod types;

pub use provider::{ObservationFetcher, ObservationSource};
pub use types::Observation;
