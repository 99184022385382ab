use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable prefix for layered overrides, e.g.
/// `WXHUB__INGEST__INTERVAL_SECS=60`.
pub const ENV_PREFIX: &str = "WXHUB";

/// Legacy variable holding the weather provider credential.
pub const LEGACY_API_KEY_VAR: &str = "API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A (city, country) pair the scheduler ingests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    pub city: String,
    pub country: String,
}

impl LocationKey {
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
        }
    }
}

impl std::fmt::Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.city, self.country)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub forecaster: ForecasterConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// External weather provider (OpenWeatherMap current-weather endpoint).
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub url: String,

    /// Provider credential. Usually supplied through the environment.
    #[serde(default)]
    pub api_key: String,

    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Check if a credential is configured (not empty or a placeholder)
    pub fn is_configured(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && !key.starts_with("YOUR_")
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("url", &self.url)
            .field("api_key", &if self.is_configured() { "<redacted>" } else { "<unset>" })
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Downstream forecasting service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecasterConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            url: "http://forecaster-service:5000".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file for observations
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("wxhub"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("observations.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Seconds between ingestion cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_locations")]
    pub locations: Vec<LocationKey>,
}

fn default_interval_secs() -> u64 {
    20
}

fn default_locations() -> Vec<LocationKey> {
    vec![LocationKey::new("guadalajara", "MX")]
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            locations: default_locations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Seconds between broadcast cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound on a single subscriber write
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

fn default_send_timeout_secs() -> u64 {
    5
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment, in that order of precedence (last wins).
    ///
    /// When `path` is `None` the per-user config file is used if it exists.
    /// A `.env` file in the working directory is read first, if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match dotenv::dotenv() {
            Ok(p) => tracing::debug!("Loaded environment from {}", p.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring malformed .env file: {}", e),
        }

        let file = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.display().to_string()).into());
                }
                Some(p.to_path_buf())
            }
            None => Self::default_config_path().filter(|p| p.exists()),
        };

        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&Config::default())
                .context("Failed to serialize default config")?,
        );
        if let Some(file) = &file {
            tracing::info!("Reading configuration from {}", file.display());
            builder = builder.add_source(config::File::from(file.as_path()).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if !config.provider.is_configured() {
            if let Ok(key) = std::env::var(LEGACY_API_KEY_VAR) {
                config.provider.api_key = key;
            }
        }

        Ok(config)
    }

    /// Load configuration and validate it.
    ///
    /// Fails on validation errors and on a missing provider credential;
    /// warnings are logged.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = Self::load(path)?;
        config.require_credential()?;

        let validation = config.validate();
        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// The provider credential, or the fatal startup error when it is absent.
    pub fn require_credential(&self) -> Result<&str, ConfigError> {
        if self.provider.is_configured() {
            Ok(self.provider.api_key.trim())
        } else {
            Err(ConfigError::MissingSetting("provider.api_key".to_string()))
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.provider.url, "provider.url", &mut result);
        self.validate_url(&self.forecaster.url, "forecaster.url", &mut result);

        if self.provider.timeout_secs == 0 {
            result.add_error("provider.timeout_secs", "Timeout must be greater than 0");
        }
        if self.forecaster.timeout_secs == 0 {
            result.add_error("forecaster.timeout_secs", "Timeout must be greater than 0");
        }

        if self.ingest.interval_secs == 0 {
            result.add_error("ingest.interval_secs", "Interval must be greater than 0");
        }
        if self.ingest.locations.is_empty() {
            result.add_warning(
                "ingest.locations",
                "No locations configured - scheduled ingestion will store nothing",
            );
        }
        for (i, loc) in self.ingest.locations.iter().enumerate() {
            if loc.city.trim().is_empty() || loc.country.trim().is_empty() {
                result.add_error(
                    format!("ingest.locations[{}]", i),
                    "City and country must both be set",
                );
            }
        }

        if self.broadcast.interval_secs == 0 {
            result.add_error("broadcast.interval_secs", "Interval must be greater than 0");
        }
        if self.broadcast.send_timeout_secs == 0 {
            result.add_error(
                "broadcast.send_timeout_secs",
                "Send timeout must be greater than 0",
            );
        } else if self.broadcast.send_timeout_secs >= self.broadcast.interval_secs {
            result.add_warning(
                "broadcast.send_timeout_secs",
                "Send timeout is not shorter than the broadcast interval",
            );
        }

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            result.add_error(
                "server.bind",
                format!("Not a socket address: {}", self.server.bind),
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Per-user configuration file location
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("wxhub").join("config.toml"))
    }
}
