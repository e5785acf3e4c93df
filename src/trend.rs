//! The [`Trend`] enum and the direction table it is looked up from.

use std::fmt;

/// Short-term rate of change reported by the CGM device.
///
/// The discriminants are the codes published on the `trend` gauge.
/// [`Trend::Unknown`] sits one past the last direction Nightscout defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Trend {
    DoubleUp = 1,
    SingleUp = 2,
    FortyFiveUp = 3,
    Flat = 4,
    FortyFiveDown = 5,
    SingleDown = 6,
    DoubleDown = 7,
    NotComputable = 8,
    RateOutOfRange = 9,
    Unknown = 10,
}

/// Every direction string Nightscout emits. Matching is exact and
/// case-sensitive.
const DIRECTIONS: [(&str, Trend); 9] = [
    ("DoubleUp", Trend::DoubleUp),
    ("SingleUp", Trend::SingleUp),
    ("FortyFiveUp", Trend::FortyFiveUp),
    ("Flat", Trend::Flat),
    ("FortyFiveDown", Trend::FortyFiveDown),
    ("SingleDown", Trend::SingleDown),
    ("DoubleDown", Trend::DoubleDown),
    ("NotComputable", Trend::NotComputable),
    ("RateOutOfRange", Trend::RateOutOfRange),
];

impl Trend {
    /// Look up a direction string. Total: anything outside the table,
    /// including the empty string, is [`Trend::Unknown`].
    pub fn from_direction(direction: &str) -> Self {
        DIRECTIONS
            .iter()
            .find(|(name, _)| *name == direction)
            .map(|(_, trend)| *trend)
            .unwrap_or(Trend::Unknown)
    }

    /// Numeric code published on the gauge.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The Nightscout spelling, or `"Unknown"`.
    pub fn as_str(self) -> &'static str {
        DIRECTIONS
            .iter()
            .find(|(_, trend)| *trend == self)
            .map(|(name, _)| *name)
            .unwrap_or("Unknown")
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
