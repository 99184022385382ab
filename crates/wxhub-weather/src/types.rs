use serde::{Deserialize, Serialize};

use wxhub_core::FetchError;

/// One reading for one location, as returned by a successful fetch.
///
/// Serialized with the field names downstream consumers already read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "Temperature_max")]
    pub temperature_max: f64,
    #[serde(rename = "Temperature_min")]
    pub temperature_min: f64,
    pub humidity: f64,
    pub city: String,
    pub country: String,
}

/// Provider response body. Only `main` is required; everything else the
/// provider sends is ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderResponse {
    pub main: MainReadings,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MainReadings {
    pub temp_max: f64,
    pub temp_min: f64,
    pub humidity: f64,
}

impl Observation {
    /// Decode a provider body for the given location.
    ///
    /// Fails closed: a missing or non-numeric `temp_max`, `temp_min` or
    /// `humidity` is a decode error, never a partial observation.
    pub fn from_provider_body(body: &str, city: &str, country: &str) -> Result<Self, FetchError> {
        let parsed: ProviderResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::Decode(format!("invalid weather data format: {}", e)))?;

        Ok(Self {
            temperature_max: parsed.main.temp_max,
            temperature_min: parsed.main.temp_min,
            humidity: parsed.main.humidity,
            city: city.to_string(),
            country: country.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "coord": {"lon": -103.35, "lat": 20.67},
        "weather": [{"id": 800, "main": "Clear"}],
        "main": {"temp": 24.1, "feels_like": 23.8, "temp_min": 22.5, "temp_max": 26.0, "pressure": 1015, "humidity": 41},
        "name": "Guadalajara"
    }"#;

    #[test]
    fn test_decode_well_formed_body() {
        let obs = Observation::from_provider_body(SAMPLE, "guadalajara", "MX").unwrap();
        assert_eq!(obs.temperature_max, 26.0);
        assert_eq!(obs.temperature_min, 22.5);
        assert_eq!(obs.humidity, 41.0);
        assert_eq!(obs.city, "guadalajara");
        assert_eq!(obs.country, "MX");
    }

    #[test]
    fn test_missing_main_is_decode_error() {
        let err = Observation::from_provider_body(r#"{"cod": 200}"#, "a", "b").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_missing_field_is_decode_error() {
        let body = r#"{"main": {"temp_max": 26.0, "humidity": 41}}"#;
        let err = Observation::from_provider_body(body, "a", "b").unwrap_err();
        match err {
            FetchError::Decode(msg) => assert!(msg.contains("temp_min"), "{}", msg),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mistyped_field_is_decode_error() {
        let body = r#"{"main": {"temp_max": "hot", "temp_min": 1.0, "humidity": 41}}"#;
        let err = Observation::from_provider_body(body, "a", "b").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_not_json_is_decode_error() {
        let err = Observation::from_provider_body("<html>", "a", "b").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_serialized_field_names() {
        let obs = Observation {
            temperature_max: 26.0,
            temperature_min: 22.5,
            humidity: 41.0,
            city: "guadalajara".to_string(),
            country: "MX".to_string(),
        };
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["Temperature_max"], 26.0);
        assert_eq!(json["Temperature_min"], 22.5);
        assert_eq!(json["humidity"], 41.0);
        assert_eq!(json["city"], "guadalajara");
    }
}
