//! A Prometheus exporter for Nightscout.
//!
//! Each time Prometheus scrapes the metrics path, the exporter fetches the
//! two most recent CGM entries from a Nightscout site, converts them to the
//! configured unit system, and republishes the latest glucose value, its
//! trend, and the change since the previous reading as labeled gauges.
//!
//! The pieces, bottom up:
//!
//! - [`NightscoutClient`] fetches `/api/v1/entries?count=2` and decodes two
//!   [`Reading`]s. It implements [`GlucoseSource`], which is the seam the
//!   tests use to swap in fake upstreams.
//! - [`ScrapeResult::from_readings`] does the unit conversion
//!   ([`GlucoseStandard`]) and trend lookup ([`Trend`]).
//! - [`GaugeSet`] owns a Prometheus recorder and publishes all three reading
//!   gauges as one unit.
//! - [`Collector`] ties those together behind a lock, so scrapes never
//!   overlap, and turns failures into log lines plus health metrics instead
//!   of errors.
//! - [`Exposition`] is the HTTP server that Prometheus talks to.
//!
//! The binary wires these up from [`Config::from_env`], with logging set up
//! by [`init_tracing`].

mod client;
pub use client::{GlucoseSource, NightscoutClient, Reading};

mod collector;
pub use collector::Collector;

mod config;
pub use config::Config;

mod error;
pub use error::{ConfigError, ScrapeError};

mod glucose;
pub use glucose::{GlucoseStandard, MGDL_PER_MMOLL, round2};

pub mod metrics;
pub use metrics::GaugeSet;

mod scrape;
pub use scrape::ScrapeResult;

mod server;
pub use server::{Exposition, landing_page, shutdown_signal};

mod trace;
pub use trace::init_tracing;

mod trend;
pub use trend::Trend;

use std::sync::Arc;

/// Build the full pipeline for `config`: client, gauge set, collector, and
/// the exposition server around them.
pub fn exporter(config: &Config) -> Result<Exposition<NightscoutClient>, ConfigError> {
    let client = NightscoutClient::new(
        config.nightscout_endpoint.clone(),
        config.nightscout_token.as_deref(),
        config.request_timeout,
    )?;
    let gauges = Arc::new(GaugeSet::new(config.source_label()));
    let collector = Arc::new(Collector::new(client, gauges, config.standard));

    Ok(Exposition::new(config.metrics_path.clone(), collector))
}
