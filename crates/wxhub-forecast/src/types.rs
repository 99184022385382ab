use serde::{Deserialize, Serialize};

/// One point of the forecast series.
///
/// `date` is passed through exactly as the forecaster formats it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: String,
    pub forecast_temp: f64,
    pub forecast_temp_lower: f64,
    pub forecast_temp_upper: f64,
}

impl ForecastPoint {
    pub fn new(date: &str, forecast_temp: f64, lower: f64, upper: f64) -> Self {
        Self {
            date: date.to_string(),
            forecast_temp,
            forecast_temp_lower: lower,
            forecast_temp_upper: upper,
        }
    }
}
