//! The published gauge set. Check the docs for [`GaugeSet`].

use crate::{ScrapeError, ScrapeResult};
use chrono::Utc;
use metrics::{Unit, counter, describe_counter, describe_gauge, gauge, with_local_recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use parking_lot::RwLock;

pub const SGV: &str = "nightscout_sgv";
const SGV_DESC: &str = "The current sgv";

pub const TREND: &str = "nightscout_trend";
const TREND_DESC: &str = "The current trend enum";

pub const BACKGROUND_DELTA: &str = "nightscout_background_delta";
const BACKGROUND_DELTA_DESC: &str = "Change from the previous sgv, in the same unit";

pub const UP: &str = "nightscout_up";
const UP_DESC: &str = "Whether the last scrape of nightscout succeeded";

pub const LAST_SUCCESS: &str = "nightscout_last_success_timestamp_seconds";
const LAST_SUCCESS_DESC: &str = "Unix time of the last successful scrape";

pub const READING_TIMESTAMP: &str = "nightscout_reading_timestamp_seconds";
const READING_TIMESTAMP_DESC: &str = "Unix time the latest published reading was taken";

pub const SCRAPES: &str = "nightscout_scrapes_total";
const SCRAPES_DESC: &str = "Scrapes of nightscout attempted";

pub const SCRAPE_ERRORS: &str = "nightscout_scrape_errors_total";
const SCRAPE_ERRORS_DESC: &str = "Failed scrapes of nightscout, by kind";

/// Process-wide metric state, owned rather than installed globally.
///
/// ## Why a local recorder?
///
/// The usual way to use the [`metrics`] crate is to install one global
/// recorder at startup and let every `gauge!` call find it. Here the gauges
/// belong to a single exporter instance, so the [`PrometheusRecorder`] lives in
/// this struct and every write goes through [`with_local_recorder`]. Several
/// `GaugeSet`s can coexist in one process, which is what the tests do.
///
/// ## Consistency
///
/// `sgv`, `trend` and `background_delta` are always written together, under
/// the write half of `consistency`. [`GaugeSet::render`] takes the read half,
/// so a scrape of the exposition endpoint never sees two of the three values
/// from one scrape and the third from another.
///
/// ## Metrics
///
/// - `nightscout_sgv` (gauge): current glucose, labeled by `glucosetype` and
///   `url`.
/// - `nightscout_trend` (gauge): numeric trend code, same labels.
/// - `nightscout_background_delta` (gauge): change from the previous
///   reading, same labels.
/// - `nightscout_up` (gauge): 1 if the last scrape succeeded, else 0.
/// - `nightscout_last_success_timestamp_seconds` (gauge)
/// - `nightscout_reading_timestamp_seconds` (gauge): only once an entry has
///   carried a `date`.
/// - `nightscout_scrapes_total` (counter)
/// - `nightscout_scrape_errors_total` (counter): labeled by `kind`.
pub struct GaugeSet {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    source_url: String,
    consistency: RwLock<()>,
}

impl std::fmt::Debug for GaugeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeSet")
            .field("source_url", &self.source_url)
            .finish_non_exhaustive()
    }
}

impl GaugeSet {
    /// Create the gauge set for one upstream. `source_url` becomes the `url`
    /// label on every series.
    pub fn new(source_url: impl Into<String>) -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        with_local_recorder(&recorder, || {
            describe_gauge!(SGV, SGV_DESC);
            describe_gauge!(TREND, TREND_DESC);
            describe_gauge!(BACKGROUND_DELTA, BACKGROUND_DELTA_DESC);
            describe_gauge!(UP, UP_DESC);
            describe_gauge!(LAST_SUCCESS, Unit::Seconds, LAST_SUCCESS_DESC);
            describe_gauge!(READING_TIMESTAMP, Unit::Seconds, READING_TIMESTAMP_DESC);
            describe_counter!(SCRAPES, SCRAPES_DESC);
            describe_counter!(SCRAPE_ERRORS, SCRAPE_ERRORS_DESC);
        });

        Self {
            recorder,
            handle,
            source_url: source_url.into(),
            consistency: RwLock::new(()),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Commit one successful scrape. All reading gauges change together.
    pub fn publish(&self, result: &ScrapeResult) {
        let _guard = self.consistency.write();
        let url = self.source_url.clone();

        with_local_recorder(&self.recorder, || {
            let labels = [("glucosetype", result.unit.to_owned()), ("url", url.clone())];
            gauge!(SGV, &labels).set(result.glucose);
            gauge!(TREND, &labels).set(f64::from(result.trend.code()));
            gauge!(BACKGROUND_DELTA, &labels).set(result.delta);

            if let Some(taken) = result.reading_time {
                gauge!(READING_TIMESTAMP, "url" => url.clone())
                    .set(taken.timestamp_millis() as f64 / 1000.0);
            }

            counter!(SCRAPES, "url" => url.clone()).increment(1);
            gauge!(UP, "url" => url.clone()).set(1.0);
            gauge!(LAST_SUCCESS, "url" => url).set(Utc::now().timestamp_millis() as f64 / 1000.0);
        });
    }

    /// Note a failed scrape. Reading gauges keep their previous values.
    pub fn record_failure(&self, err: &ScrapeError) {
        let _guard = self.consistency.write();
        let url = self.source_url.clone();

        with_local_recorder(&self.recorder, || {
            counter!(SCRAPES, "url" => url.clone()).increment(1);
            counter!(SCRAPE_ERRORS, "url" => url.clone(), "kind" => err.kind()).increment(1);
            gauge!(UP, "url" => url).set(0.0);
        });
    }

    /// Everything in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let _guard = self.consistency.read();
        self.handle.render()
    }
}

/// Pull a sample value out of rendered exposition text: the first series
/// named `name` carrying every `labels` pair exactly. Handy for probes and
/// tests.
pub fn sample(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            let (series_name, label_set) = match series.split_once('{') {
                Some((series_name, rest)) => (series_name, rest.strip_suffix('}')?),
                None => (series, ""),
            };
            if series_name != name {
                return None;
            }
            let pairs = label_pairs(label_set)?;
            let matches = labels
                .iter()
                .all(|(key, val)| pairs.iter().any(|(k, v)| k == key && v == val));
            matches.then(|| value.parse().ok()).flatten()
        })
}

/// `a="1",b="x\"y"` to `[("a", "1"), ("b", "x\"y")]`, unescaping values.
fn label_pairs(mut rest: &str) -> Option<Vec<(&str, String)>> {
    let mut pairs = Vec::new();
    while !rest.is_empty() {
        let (key, tail) = rest.split_once("=\"")?;
        let mut value = String::new();
        let mut chars = tail.char_indices();
        let end = loop {
            match chars.next()? {
                (at, '"') => break at,
                (_, '\\') => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    escaped => value.push(escaped),
                },
                (_, c) => value.push(c),
            }
        };
        pairs.push((key.trim(), value));
        rest = tail[end + 1..].trim_start_matches(',');
    }
    Some(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScrapeError, Trend};

    fn result(glucose: f64, delta: f64, trend: Trend) -> ScrapeResult {
        ScrapeResult {
            glucose,
            delta,
            trend,
            unit: "mmol/L",
            reading_time: None,
        }
    }

    #[test]
    fn nothing_rendered_before_first_scrape() {
        let gauges = GaugeSet::new("http://cgm.local");
        assert_eq!(sample(&gauges.render(), SGV, &[]), None);
    }

    #[test]
    fn publish_sets_all_three_gauges_with_labels() {
        let gauges = GaugeSet::new("http://cgm.local");
        gauges.publish(&result(5.56, -0.28, Trend::Flat));

        let text = gauges.render();
        assert_eq!(
            sample(
                &text,
                SGV,
                &[("glucosetype", "mmol/L"), ("url", "http://cgm.local")]
            ),
            Some(5.56)
        );
        assert_eq!(sample(&text, TREND, &[]), Some(4.0));
        assert_eq!(sample(&text, BACKGROUND_DELTA, &[]), Some(-0.28));
        assert_eq!(sample(&text, UP, &[]), Some(1.0));
        assert_eq!(sample(&text, SCRAPES, &[]), Some(1.0));
        assert!(sample(&text, LAST_SUCCESS, &[]).is_some_and(|ts| ts > 0.0));
        assert_eq!(sample(&text, READING_TIMESTAMP, &[]), None);
        assert!(text.contains("# HELP nightscout_sgv The current sgv"));
    }

    #[test]
    fn failure_keeps_previous_values() {
        let gauges = GaugeSet::new("http://cgm.local");
        gauges.publish(&result(7.1, 0.3, Trend::SingleUp));
        gauges.record_failure(&ScrapeError::Authentication);

        let text = gauges.render();
        assert_eq!(sample(&text, SGV, &[]), Some(7.1));
        assert_eq!(sample(&text, TREND, &[]), Some(2.0));
        assert_eq!(sample(&text, BACKGROUND_DELTA, &[]), Some(0.3));
        assert_eq!(sample(&text, UP, &[]), Some(0.0));
        assert_eq!(sample(&text, SCRAPES, &[]), Some(2.0));
        assert_eq!(
            sample(&text, SCRAPE_ERRORS, &[("kind", "authentication")]),
            Some(1.0)
        );
        assert_eq!(sample(&text, SCRAPE_ERRORS, &[("kind", "decode")]), None);
    }

    #[test]
    fn republishing_overwrites() {
        let gauges = GaugeSet::new("http://cgm.local");
        gauges.publish(&result(5.0, 0.1, Trend::Flat));
        gauges.publish(&result(6.0, 1.0, Trend::DoubleUp));

        let text = gauges.render();
        assert_eq!(sample(&text, SGV, &[]), Some(6.0));
        assert_eq!(sample(&text, TREND, &[]), Some(1.0));
        assert_eq!(sample(&text, BACKGROUND_DELTA, &[]), Some(1.0));
    }

    #[test]
    fn gauge_sets_are_independent() {
        let first = GaugeSet::new("http://one.local");
        let second = GaugeSet::new("http://two.local");
        first.publish(&result(5.0, 0.0, Trend::Flat));

        assert_eq!(sample(&first.render(), SGV, &[]), Some(5.0));
        assert_eq!(sample(&second.render(), SGV, &[]), None);
    }

    #[test]
    fn sample_ignores_prefix_collisions() {
        let text = "nightscout_sgv_other 3\nnightscout_sgv{a=\"b\"} 4\n";
        assert_eq!(sample(text, "nightscout_sgv", &[]), Some(4.0));
        assert_eq!(sample(text, "nightscout_sgv", &[("a", "b")]), Some(4.0));
        assert_eq!(sample(text, "nightscout_sgv", &[("a", "c")]), None);
    }

    #[test]
    fn sample_matches_whole_labels() {
        let text = "nightscout_up{source_url=\"http://x\"} 1\n\
                    nightscout_up{url=\"http://x/ns\"} 2\n\
                    nightscout_up{kind=\"a,b\",url=\"http://x\"} 3\n";
        assert_eq!(sample(text, UP, &[("url", "http://x")]), Some(3.0));
        assert_eq!(sample(text, UP, &[("kind", "a,b")]), Some(3.0));
        assert_eq!(sample(text, UP, &[("kind", "a")]), None);
        assert_eq!(sample(text, UP, &[("source_url", "http://x")]), Some(1.0));
    }

    #[test]
    fn sample_unescapes_label_values() {
        let text = "nightscout_up{url=\"say \\\"hi\\\"\"} 1\n";
        assert_eq!(sample(text, UP, &[("url", "say \"hi\"")]), Some(1.0));
    }
}
