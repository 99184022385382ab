//! Forecasting service API client.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use wxhub_core::{FetchError, ForecasterConfig, ReqwestErrorExt};

use crate::cache::{CachedForecast, LatestSnapshot};
use crate::types::ForecastPoint;

/// Client for the forecaster's `/forecast` and `/forecast/latest` endpoints.
///
/// Cloning is cheap and clones share the latest-forecast cache.
#[derive(Debug, Clone)]
pub struct ForecastClient {
    client: reqwest::Client,
    base_url: String,
    latest: Arc<LatestSnapshot>,
}

impl ForecastClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| e.into_fetch_error())?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            latest: Arc::new(LatestSnapshot::new()),
        })
    }

    pub fn from_config(config: &ForecasterConfig) -> Result<Self, FetchError> {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    /// Fetch the full forecast series, in the order the forecaster returns it.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_series(&self) -> Result<Vec<ForecastPoint>, FetchError> {
        let series: Vec<ForecastPoint> = self.get_json("forecast").await?;

        match (series.first(), series.last()) {
            (Some(first), Some(last)) => tracing::debug!(
                "Forecast series: {} points, first {:?}, last {:?}",
                series.len(),
                first,
                last
            ),
            _ => tracing::debug!("Forecast series is empty"),
        }

        Ok(series)
    }

    /// Fetch the single latest point from the forecaster's shortcut endpoint.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_latest_direct(&self) -> Result<ForecastPoint, FetchError> {
        self.get_json("forecast/latest").await
    }

    /// The latest forecast point, deriving it from the full series when the
    /// shortcut endpoint fails for any reason.
    ///
    /// The derived point is the last element of the series as returned.
    /// Every success overwrites the cache read by [`Self::cached_latest`].
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_latest(&self) -> Result<ForecastPoint, FetchError> {
        match self.fetch_latest_direct().await {
            Ok(point) => {
                self.latest.store(point.clone(), false);
                return Ok(point);
            }
            Err(e) => {
                tracing::debug!("Latest forecast shortcut failed, using series: {}", e);
            }
        }

        let series = self.fetch_series().await?;
        let point = series.last().cloned().ok_or(FetchError::EmptySeries)?;
        tracing::debug!("Derived latest forecast from series tail: {}", point.date);

        self.latest.store(point.clone(), true);
        Ok(point)
    }

    /// The last point stored by a successful [`Self::fetch_latest`].
    pub fn cached_latest(&self) -> Option<CachedForecast> {
        self.latest.get()
    }

    /// GET `{base}/{endpoint}` and decode a 2xx body.
    ///
    /// Transport failures are reported before any status is inspected.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.into_fetch_error())?;

        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, FetchError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| e.into_fetch_error())?;

        if !status.is_success() {
            return Err(FetchError::status(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| FetchError::Decode(format!("invalid forecast format: {}", e)))
    }
}
