//! Turning two readings into the values we publish.

use crate::{GlucoseStandard, Reading, ScrapeError, Trend};
use chrono::{DateTime, Utc};

/// The published values derived from one scrape. Built fresh every time and
/// never carried over.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    /// Latest glucose in the configured unit.
    pub glucose: f64,
    /// Latest minus previous, same unit.
    pub delta: f64,
    pub trend: Trend,
    /// `glucosetype` label value.
    pub unit: &'static str,
    /// When the latest reading was taken, if known.
    pub reading_time: Option<DateTime<Utc>>,
}

impl ScrapeResult {
    /// Derive published values from the newest and second-newest entries.
    pub fn from_readings(
        latest: &Reading,
        previous: &Reading,
        standard: GlucoseStandard,
    ) -> Result<Self, ScrapeError> {
        let latest_sgv = latest.sgv.ok_or(ScrapeError::Transform { field: "sgv" })?;
        let previous_sgv = previous.sgv.ok_or(ScrapeError::Transform { field: "sgv" })?;

        Ok(Self {
            glucose: standard.glucose(latest_sgv),
            delta: standard.delta(latest_sgv, previous_sgv),
            trend: Trend::from_direction(latest.direction.as_deref().unwrap_or_default()),
            unit: standard.unit_label(),
            reading_time: latest.timestamp(),
        })
    }
}
