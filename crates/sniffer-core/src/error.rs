use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for the sniffer core.
#[derive(Error, Debug)]
pub enum AppError {
    /// The circuit breaker refused the request; nothing was sent.
    #[error("Circuit breaker '{name}' is open. Retry after {} seconds.", .retry_after.as_secs())]
    CircuitOpen { name: String, retry_after: Duration },

    /// 403 from the target (WAF or bot detection). Never retried.
    #[error("Access denied (HTTP {status}) for {url}")]
    AccessDenied { url: String, status: u16 },

    /// 429 from the target, after waiting out the server-directed delay.
    #[error("Rate limited (HTTP 429) for {url}, waited {} seconds", .waited.as_secs())]
    RateLimited { url: String, waited: Duration },

    /// 5xx from the target.
    #[error("Server error (HTTP {status}) for {url}")]
    ServerError { url: String, status: u16 },

    /// Any other unsuccessful status (404, 410, ...).
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The request URL is not an absolute http(s) URL. Nothing was sent.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network/connection error, or retries exhausted.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// A single raw item could not be normalized into a product.
    #[error("Normalization error: {0}")]
    NormalizationError(String),

    /// A whole work unit failed (e.g. its raw fetch).
    #[error("Unit '{unit}' failed: {message}")]
    UnitError { unit: String, message: String },

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Persistence sink failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The client was closed and accepts no more requests.
    #[error("Client is closed")]
    ClientClosed,
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited { .. }
                | AppError::ServerError { .. }
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
        )
    }

    /// Returns true if this error counts as a circuit breaker failure the
    /// moment it is observed. Transport errors only count once retries are
    /// exhausted, and 429s never do.
    pub fn should_trip_circuit(&self) -> bool {
        matches!(
            self,
            AppError::AccessDenied { .. } | AppError::ServerError { .. }
        )
    }
}
