//! Centralized error types for wxhub.
//!
//! This module provides a typed error hierarchy that:
//! - Separates transport, status and decode failures of outbound calls
//! - Provides stable, human-readable messages for response payloads
//! - Preserves full error context for logging

use thiserror::Error;

/// Top-level application error type.
///
/// Library crates return the narrower types below; the binary and the HTTP
/// layer convert into this one.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a short message suitable for a response payload.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Fetch(e) => e.user_message(),
            AppError::Database(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Ingest(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed.",
            AppError::Other(_) => "An unexpected error occurred.",
        }
    }
}

/// Failure of an outbound HTTP call to the weather provider or forecaster.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, reset, DNS failure and similar.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("Unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// The body was not valid JSON or lacked an expected field.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The forecast series came back empty, so no latest point exists.
    #[error("Forecast series is empty")]
    EmptySeries,
}

impl FetchError {
    /// Build a status error, keeping at most a short excerpt of the body.
    pub fn status(status: u16, body: &str) -> Self {
        const MAX_EXCERPT: usize = 200;
        let message = match body.char_indices().nth(MAX_EXCERPT) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        FetchError::Status { status, message }
    }

    /// True when the request never produced a response.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Timeout)
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "Unable to reach the upstream service.",
            FetchError::Timeout => "The upstream service timed out.",
            FetchError::Status { status, .. } if *status == 401 => {
                "The weather provider rejected the configured API key."
            }
            FetchError::Status { status, .. } if *status == 404 => {
                "Location not found."
            }
            FetchError::Status { status, .. } if *status >= 500 => {
                "The upstream service is experiencing issues."
            }
            FetchError::Status { .. } => "The upstream request failed.",
            FetchError::Decode(_) => "Received an unexpected response from the upstream service.",
            FetchError::EmptySeries => "No forecast is available yet.",
        }
    }
}

/// Persistence errors (the observation store).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => "Unable to open the observation store.",
            DatabaseError::QueryFailed(_) => "Storing the observation failed.",
            DatabaseError::Corruption(_) => "The observation store may be corrupted.",
        }
    }
}

/// Configuration errors. Any of these at startup is fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration file not found.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed.",
            ConfigError::MissingSetting(_) => "A required setting is missing.",
        }
    }
}

/// One location's fetch-and-store attempt failed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Store(#[from] DatabaseError),

    /// Another attempt for the same location is still running.
    #[error("Ingestion already in progress for {0}")]
    Busy(String),
}

impl IngestError {
    pub fn user_message(&self) -> &'static str {
        match self {
            IngestError::Fetch(e) => e.user_message(),
            IngestError::Store(e) => e.user_message(),
            IngestError::Busy(_) => "An ingestion for this location is already running.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_fetch_error(self) -> FetchError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_fetch_error(self) -> FetchError {
        if self.is_timeout() {
            FetchError::Timeout
        } else if self.is_decode() {
            FetchError::Decode(self.to_string())
        } else if let Some(status) = self.status() {
            FetchError::Status {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            FetchError::Transport(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                DatabaseError::Corruption(self.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen =>
            {
                DatabaseError::ConnectionFailed(self.to_string())
            }
            _ => DatabaseError::QueryFailed(self.to_string()),
        }
    }
}
