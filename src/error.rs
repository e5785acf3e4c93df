//! Error types for startup configuration and for individual scrapes.

use reqwest::StatusCode;

/// Startup errors. Any of these stops the process before a listener is bound.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("NIGHTSCOUT_ENDPOINT is required")]
    MissingEndpoint,

    #[error("NIGHTSCOUT_ENDPOINT {value:?} is not an http(s) URL: {reason}")]
    InvalidEndpoint { value: String, reason: String },

    #[error("TELEMETRY_ADDRESS {value:?} is not a host:port address")]
    InvalidListenAddress { value: String },

    #[error("NIGHTSCOUT_TIMEOUT_SECS {value:?} must be a positive number of seconds")]
    InvalidTimeout { value: String },

    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// Why a single scrape did not publish.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("nightscout unreachable: {0}")]
    Connectivity(#[source] reqwest::Error),

    #[error("nightscout rejected the token (HTTP 401)")]
    Authentication,

    #[error("nightscout answered with HTTP {0}")]
    UnexpectedStatus(StatusCode),

    #[error("malformed entries response")]
    Decode(#[from] serde_json::Error),

    #[error("expected at least 2 entries, got {count}")]
    TooFewEntries { count: usize },

    #[error("entry is missing `{field}`")]
    Transform { field: &'static str },
}

impl ScrapeError {
    /// Stable, low-cardinality name for logs and the errors counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Connectivity(_) => "connectivity",
            ScrapeError::Authentication => "authentication",
            ScrapeError::UnexpectedStatus(_) => "status",
            ScrapeError::Decode(_) | ScrapeError::TooFewEntries { .. } => "decode",
            ScrapeError::Transform { .. } => "transform",
        }
    }
}
