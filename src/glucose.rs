//! Unit policy for published glucose values.

use std::{fmt, str::FromStr};

/// mg/dL per mmol/L, as Nightscout and most CGM vendors use it.
pub const MGDL_PER_MMOLL: f64 = 18.0;

/// Which blood-glucose unit system to publish in.
///
/// `US` publishes raw mg/dL. Everything else, including an unset variable,
/// publishes mmol/L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlucoseStandard {
    Us,
    #[default]
    Uk,
}

impl GlucoseStandard {
    /// Value of the `glucosetype` label.
    pub fn unit_label(self) -> &'static str {
        match self {
            GlucoseStandard::Us => "mg/dL",
            GlucoseStandard::Uk => "mmol/L",
        }
    }

    /// The latest reading in this unit system.
    pub fn glucose(self, latest_mgdl: i64) -> f64 {
        match self {
            GlucoseStandard::Us => latest_mgdl as f64,
            GlucoseStandard::Uk => round2(to_mmoll(latest_mgdl)),
        }
    }

    /// Change between two readings in this unit system.
    ///
    /// For mmol/L both readings are converted, subtracted unrounded, and
    /// only the difference is rounded.
    pub fn delta(self, latest_mgdl: i64, previous_mgdl: i64) -> f64 {
        match self {
            GlucoseStandard::Us => latest_mgdl as f64 - previous_mgdl as f64,
            GlucoseStandard::Uk => round2(to_mmoll(latest_mgdl) - to_mmoll(previous_mgdl)),
        }
    }
}

impl FromStr for GlucoseStandard {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "US" => GlucoseStandard::Us,
            _ => GlucoseStandard::Uk,
        })
    }
}

impl fmt::Display for GlucoseStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlucoseStandard::Us => f.write_str("US"),
            GlucoseStandard::Uk => f.write_str("UK"),
        }
    }
}

fn to_mmoll(mgdl: i64) -> f64 {
    mgdl as f64 / MGDL_PER_MMOLL
}

/// Round to two decimal places, ties away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
