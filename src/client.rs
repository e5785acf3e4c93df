//! The Nightscout entries API client.

use crate::{ConfigError, ScrapeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// One CGM entry, as returned by `/api/v1/entries`.
///
/// Only `sgv` and `direction` matter for publishing. Every field is optional
/// on the wire so that a missing one surfaces as a transform error rather
/// than failing to decode the whole response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reading {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    /// Uploader device name.
    #[serde(rename = "device", default)]
    pub device_name: Option<String>,

    /// Sensor glucose value in mg/dL.
    #[serde(default)]
    pub sgv: Option<i64>,

    /// Trend direction, e.g. `"Flat"`.
    #[serde(default)]
    pub direction: Option<String>,

    /// Epoch milliseconds.
    #[serde(default)]
    pub date: Option<f64>,
}

impl Reading {
    /// When the sensor took this reading, if the entry says.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date
            .filter(|millis| millis.is_finite())
            .and_then(|millis| DateTime::from_timestamp_millis(millis as i64))
    }
}

/// Something that can produce the two most recent readings, newest first.
#[async_trait]
pub trait GlucoseSource: Send + Sync {
    async fn latest_readings(&self) -> Result<(Reading, Reading), ScrapeError>;
}

/// Fetches readings from a Nightscout site over HTTP.
///
/// Stateless between calls, apart from the pooled [`Client`].
#[derive(Debug, Clone)]
pub struct NightscoutClient {
    client: Client,
    endpoint: Url,
    entries_url: Url,
}

impl NightscoutClient {
    /// Build a client for the site at `endpoint`. The token, if any, is
    /// baked into the request URL.
    pub fn new(endpoint: Url, token: Option<&str>, timeout: Duration) -> Result<Self, ConfigError> {
        let entries_url = entries_url(&endpoint, token)?;
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            endpoint,
            entries_url,
        })
    }

    /// The configured site, without the token.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl GlucoseSource for NightscoutClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint), err(Display))]
    async fn latest_readings(&self) -> Result<(Reading, Reading), ScrapeError> {
        let response = self
            .client
            .get(self.entries_url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(connectivity)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED => return Err(ScrapeError::Authentication),
            status => return Err(ScrapeError::UnexpectedStatus(status)),
        }

        let body = response.bytes().await.map_err(connectivity)?;
        debug!(bytes = body.len(), "received entries");

        latest_two(serde_json::from_slice(&body)?)
    }
}

/// The request URL carries the token, so it is stripped before the error
/// can reach a log line.
fn connectivity(err: reqwest::Error) -> ScrapeError {
    ScrapeError::Connectivity(err.without_url())
}

/// `{endpoint}/api/v1/entries?count=2[&token=…]`
pub(crate) fn entries_url(endpoint: &Url, token: Option<&str>) -> Result<Url, ConfigError> {
    let mut url = endpoint.clone();
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| ConfigError::InvalidEndpoint {
            value: endpoint.to_string(),
            reason: "URL cannot carry a path".to_owned(),
        })?
        .pop_if_empty()
        .extend(["api", "v1", "entries"]);

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("count", "2");
        if let Some(token) = token {
            query.append_pair("token", token);
        }
    }

    Ok(url)
}

/// Newest-first list to a `(latest, previous)` pair.
fn latest_two(entries: Vec<Reading>) -> Result<(Reading, Reading), ScrapeError> {
    let count = entries.len();
    let mut entries = entries.into_iter();
    match (entries.next(), entries.next()) {
        (Some(latest), Some(previous)) => Ok((latest, previous)),
        _ => Err(ScrapeError::TooFewEntries { count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn entries_url_appends_path_and_count() {
        let built = entries_url(&url("https://cgm.example.com"), None).unwrap();
        assert_eq!(built.as_str(), "https://cgm.example.com/api/v1/entries?count=2");

        let built = entries_url(&url("https://cgm.example.com/ns/"), None).unwrap();
        assert_eq!(built.as_str(), "https://cgm.example.com/ns/api/v1/entries?count=2");
    }

    #[test]
    fn entries_url_encodes_token() {
        let built = entries_url(&url("http://localhost:1337"), Some("ro-a1b2&x")).unwrap();
        assert_eq!(
            built.as_str(),
            "http://localhost:1337/api/v1/entries?count=2&token=ro-a1b2%26x"
        );
    }

    #[test]
    fn decodes_nightscout_entries() {
        let body = r#"[
            {"_id":"a1","device":"xDrip-DexcomG6","sgv":100,"direction":"Flat",
             "date":1700000000000,"dateString":"2023-11-14T22:13:20.000Z","type":"sgv"},
            {"_id":"a0","device":"xDrip-DexcomG6","sgv":105,"direction":"SingleUp",
             "date":1699999700000,"type":"sgv"}
        ]"#;
        let (latest, previous) = latest_two(serde_json::from_str(body).unwrap()).unwrap();
        assert_eq!(latest.sgv, Some(100));
        assert_eq!(latest.direction.as_deref(), Some("Flat"));
        assert_eq!(latest.device_name.as_deref(), Some("xDrip-DexcomG6"));
        assert_eq!(latest.timestamp().unwrap().timestamp(), 1_700_000_000);
        assert_eq!(previous.sgv, Some(105));
        assert_eq!(previous.id.as_deref(), Some("a0"));
    }

    #[test]
    fn fewer_than_two_entries_is_an_error() {
        let one: Vec<Reading> = serde_json::from_str(r#"[{"sgv":100}]"#).unwrap();
        assert!(matches!(
            latest_two(one),
            Err(ScrapeError::TooFewEntries { count: 1 })
        ));
        assert!(matches!(
            latest_two(Vec::new()),
            Err(ScrapeError::TooFewEntries { count: 0 })
        ));
    }

    #[test]
    fn wrong_shape_fails_to_decode() {
        assert!(serde_json::from_str::<Vec<Reading>>(r#"{"sgv":100}"#).is_err());
        assert!(serde_json::from_str::<Vec<Reading>>(r#"[{"sgv":"100"}]"#).is_err());
    }
}
