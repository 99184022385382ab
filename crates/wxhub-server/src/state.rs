use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use wxhub_forecast::ForecastClient;
use wxhub_services::IngestionScheduler;
use wxhub_weather::ObservationSource;

use crate::hub::BroadcastHub;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub observations: Arc<dyn ObservationSource>,
    pub forecast: ForecastClient,
    pub hub: Arc<BroadcastHub>,
    pub scheduler: IngestionScheduler,
    /// Fires when the process is shutting down; open sockets watch it.
    pub shutdown: CancellationToken,
}
