//! Request/response handlers: current weather plus latest forecast.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use wxhub_core::LocationKey;
use wxhub_forecast::{CachedForecast, ForecastPoint};
use wxhub_weather::Observation;

use crate::error::ApiError;
use crate::state::AppState;

/// Message returned in place of a forecast the forecaster could not supply.
pub const FORECAST_UNAVAILABLE: &str = "Could not load forecast";

/// Body of `GET /` and `POST /fetch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<Observation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocationForm {
    pub city: String,
    pub country: String,
}

/// Fill in the forecast half of a snapshot, degrading to an error message.
async fn with_latest_forecast(state: &AppState, mut snapshot: SnapshotResponse) -> SnapshotResponse {
    match state.forecast.fetch_latest().await {
        Ok(point) => snapshot.forecast = Some(point),
        Err(e) => {
            tracing::warn!("Latest forecast unavailable: {}", e);
            snapshot.error = Some(FORECAST_UNAVAILABLE.to_string());
        }
    }
    snapshot
}

/// `GET /`. Always 200; a forecast failure becomes an error field.
pub async fn read_latest(State(state): State<AppState>) -> Json<SnapshotResponse> {
    Json(with_latest_forecast(&state, SnapshotResponse::default()).await)
}

/// `POST /fetch`. Weather for the submitted location, then the latest forecast.
///
/// A weather failure answers 500 without contacting the forecaster.
pub async fn fetch_by_location(
    State(state): State<AppState>,
    Form(form): Form<LocationForm>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    let location = parse_location(&form.city, &form.country)?;

    let weather = state.observations.fetch(&location).await.map_err(|e| {
        tracing::warn!("Weather fetch failed for {}: {}", location, e);
        ApiError::from(e)
    })?;

    let snapshot = SnapshotResponse {
        weather: Some(weather),
        ..Default::default()
    };
    Ok(Json(with_latest_forecast(&state, snapshot).await))
}

/// `GET /fetch/{city}/{country}`. Fetch and store one observation now.
pub async fn ingest_location(
    State(state): State<AppState>,
    Path((city, country)): Path<(String, String)>,
) -> Result<Json<JsonValue>, ApiError> {
    let location = parse_location(&city, &country)?;
    let observation = state.scheduler.ingest_one(&location).await?;
    Ok(Json(serde_json::json!({ "data": observation })))
}

/// `GET /forecast/cached`. The last latest forecast retrieved, if any.
pub async fn cached_forecast(State(state): State<AppState>) -> Result<Json<CachedForecast>, ApiError> {
    state
        .forecast
        .cached_latest()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No forecast cached yet"))
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<JsonValue>) {
    let subscribers = state.hub.subscriber_count().await;
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "subscribers": subscribers })),
    )
}

fn parse_location(city: &str, country: &str) -> Result<LocationKey, ApiError> {
    let (city, country) = (city.trim(), country.trim());
    if city.is_empty() || country.is_empty() {
        return Err(ApiError::bad_request("city and country are required"));
    }
    Ok(LocationKey::new(city, country))
}
