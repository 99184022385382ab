//! Weather provider client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::instrument;

use wxhub_core::{FetchError, LocationKey, ProviderConfig, ReqwestErrorExt};

use crate::types::Observation;

/// Something that can produce one observation for one location.
///
/// The scheduler and the HTTP layer depend on this rather than on the
/// concrete client so tests can substitute canned or failing sources.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self, location: &LocationKey) -> Result<Observation, FetchError>;
}

/// Fetches current conditions from the configured provider.
#[derive(Clone)]
pub struct ObservationFetcher {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ObservationFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationFetcher")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ObservationFetcher {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| e.into_fetch_error())?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, FetchError> {
        Self::new(
            &config.url,
            config.api_key.trim(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Fetch current conditions for one location.
    ///
    /// City and country are sent as query parameters, so reserved
    /// characters are percent-encoded.
    #[instrument(skip(self), fields(location = %location), level = "debug")]
    pub async fn fetch_observation(&self, location: &LocationKey) -> Result<Observation, FetchError> {
        let query = format!("{},{}", location.city, location.country);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| e.without_url().into_fetch_error())?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| e.without_url().into_fetch_error())?;

        if !status.is_success() {
            tracing::warn!("Weather provider returned {} for {}", status, location);
            return Err(FetchError::status(status.as_u16(), &body));
        }

        let observation = Observation::from_provider_body(&body, &location.city, &location.country)?;
        tracing::debug!(
            "Observation for {}: max {:.1}, min {:.1}, humidity {:.0}",
            location,
            observation.temperature_max,
            observation.temperature_min,
            observation.humidity
        );
        Ok(observation)
    }
}

#[async_trait]
impl ObservationSource for ObservationFetcher {
    async fn fetch(&self, location: &LocationKey) -> Result<Observation, FetchError> {
        self.fetch_observation(location).await
    }
}
