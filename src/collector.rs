//! The scrape pipeline. This module contains the [`Collector`] struct.

use crate::{GaugeSet, GlucoseSource, GlucoseStandard, ScrapeError, ScrapeResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info_span, trace, warn};

/// Fetches, transforms and publishes one reading per collection request.
///
/// Scrapes are strictly serialized: the scrape lock is held from the upstream
/// fetch until the gauges are committed, so concurrent collection requests
/// queue up behind each other rather than interleaving writes.
pub struct Collector<S> {
    source: S,
    gauges: Arc<GaugeSet>,
    standard: GlucoseStandard,

    /// Guards the whole scrape. The value is the number of scrapes started,
    /// used as the span's `scrape_id`.
    scrape_lock: Mutex<u64>,
}

impl<S: GlucoseSource> Collector<S> {
    /// Create a collector publishing into `gauges`.
    pub fn new(source: S, gauges: Arc<GaugeSet>, standard: GlucoseStandard) -> Self {
        Self {
            source,
            gauges,
            standard,
            scrape_lock: Mutex::new(0),
        }
    }

    pub fn gauges(&self) -> &Arc<GaugeSet> {
        &self.gauges
    }

    pub fn standard(&self) -> GlucoseStandard {
        self.standard
    }

    /// Run one scrape and report how it went.
    ///
    /// On success all three reading gauges are replaced together. On failure
    /// they keep whatever the last successful scrape published, and only the
    /// health metrics change.
    pub async fn scrape(&self) -> Result<ScrapeResult, ScrapeError> {
        let mut started = self.scrape_lock.lock().await;
        *started = started.wrapping_add(1);

        // A fresh root span per scrape, carrying its sequence number, so
        // that the client's spans and our events can be correlated.
        let span = info_span!(
            "scrape",
            scrape_id = *started,
            url = self.gauges.source_url(),
            standard = %self.standard
        );

        async {
            let outcome = self.fetch_and_transform().await;
            match &outcome {
                Ok(result) => {
                    trace!("publishing");
                    self.gauges.publish(result);
                }
                Err(err) => self.gauges.record_failure(err),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn fetch_and_transform(&self) -> Result<ScrapeResult, ScrapeError> {
        trace!("fetching");
        let (latest, previous) = self.source.latest_readings().await?;

        trace!(latest = ?latest.sgv, previous = ?previous.sgv, "transforming");
        ScrapeResult::from_readings(&latest, &previous, self.standard)
    }

    /// The exposition layer's entry point. Never fails: a scrape error is
    /// logged and the previously published values stay in place.
    pub async fn collect(&self) -> Option<ScrapeResult> {
        match self.scrape().await {
            Ok(result) => {
                debug!(
                    glucose = result.glucose,
                    delta = result.delta,
                    trend = %result.trend,
                    unit = result.unit,
                    "published reading"
                );
                Some(result)
            }
            Err(err) => {
                warn!(
                    url = self.gauges.source_url(),
                    kind = err.kind(),
                    error = %err,
                    "scrape failed, serving previous values"
                );
                None
            }
        }
    }
}
