//! Forecasting service client for wxhub.

pub mod cache;
pub mod client;
pub mod types;

pub use cache::{CachedForecast, LatestSnapshot};
pub use client::ForecastClient;
pub use types::ForecastPoint;
