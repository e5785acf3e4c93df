//! Environment-driven configuration.

use crate::{ConfigError, GlucoseStandard};
use std::{env, time::Duration};
use url::Url;

const DEFAULT_LISTEN_ADDRESS: &str = ":9552";
const DEFAULT_METRICS_PATH: &str = "/metrics";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Exporter configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the exposition server listens, as `host:port`. The host may be
    /// a name; it is resolved when binding.
    pub listen_address: String,
    /// Path serving the metrics text. Always starts with `/`.
    pub metrics_path: String,
    /// Base URL of the Nightscout site.
    pub nightscout_endpoint: Url,
    /// Optional API token, sent as the `token` query parameter.
    pub nightscout_token: Option<String>,
    pub standard: GlucoseStandard,
    /// Upper bound on a single upstream request.
    pub request_timeout: Duration,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let nightscout_endpoint =
            parse_endpoint(&get("NIGHTSCOUT_ENDPOINT").ok_or(ConfigError::MissingEndpoint)?)?;

        let listen_address = parse_listen_address(
            get("TELEMETRY_ADDRESS")
                .as_deref()
                .unwrap_or(DEFAULT_LISTEN_ADDRESS),
        )?;

        let metrics_path = match get("TELEMETRY_ENDPOINT") {
            Some(path) if path.starts_with('/') => path,
            Some(path) => format!("/{path}"),
            None => DEFAULT_METRICS_PATH.to_owned(),
        };

        let standard = get("BLOOD_GLUCOSE_STANDARD")
            .map(|value| {
                if value.trim() != "US" && value.trim() != "UK" {
                    tracing::warn!(value = %value, "unrecognised BLOOD_GLUCOSE_STANDARD, using UK");
                }
                value.parse::<GlucoseStandard>().unwrap_or_default()
            })
            .unwrap_or_default();

        let request_timeout = match get("NIGHTSCOUT_TIMEOUT_SECS") {
            Some(value) => parse_timeout(&value)?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            listen_address,
            metrics_path,
            nightscout_endpoint,
            nightscout_token: get("NIGHTSCOUT_TOKEN"),
            standard,
            request_timeout,
        })
    }

    /// The `url` label value: the configured endpoint without a trailing
    /// slash.
    pub fn source_label(&self) -> String {
        self.nightscout_endpoint
            .as_str()
            .trim_end_matches('/')
            .to_owned()
    }
}

fn parse_endpoint(value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        value: value.to_owned(),
        reason,
    };
    let url = Url::parse(value.trim()).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    Ok(url)
}

/// Accepts `host:port`, and Go-style `:port` meaning every interface.
///
/// Only the port is checked here. Host names are left for the resolver.
fn parse_listen_address(value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::InvalidListenAddress {
        value: value.to_owned(),
    };

    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    port.parse::<u16>().map_err(|_| invalid())?;
    if host.is_empty() {
        Ok(format!("0.0.0.0:{port}"))
    } else {
        Ok(value.to_owned())
    }
}

fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| ConfigError::InvalidTimeout {
            value: value.to_owned(),
        })
}
