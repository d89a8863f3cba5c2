//! Metric kind bitmask for per-field instruments
//!
//! A field may request any combination of the four kinds; each set bit yields
//! one instrument. Kinds are tested independently, never matched as a variant.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer};

use crate::constants::{
    COUNTER_SUFFIX, COUNTER_TAIL, GAUGE_SUFFIX, GAUGE_TAIL, HISTOGRAM_SUFFIX, HISTOGRAM_TAIL,
    SUMMARY_SUFFIX, SUMMARY_TAIL,
};
use crate::error::{NamespaceError, Result};

bitflags! {
    /// Set of requested kinds, decoded from `metrics_type`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MetricKinds: u32 {
        const COUNTER = 1;
        const GAUGE = 2;
        const HISTOGRAM = 4;
        const SUMMARY = 8;
    }
}

impl MetricKinds {
    /// Accepts any subset of the four kind bits, including none
    pub fn from_config_bits(bits: u32) -> Result<Self> {
        Self::from_bits(bits).ok_or(NamespaceError::InvalidMetricKinds(bits))
    }

    /// Kinds present in this set, in counter, gauge, histogram, summary order
    pub fn kinds(self) -> impl Iterator<Item = MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(kind.flag()))
    }

    pub(crate) fn deserialize_bits<'de, D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Self::from_config_bits(bits).map_err(serde::de::Error::custom)
    }
}

/// One instrument kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Counter,
        MetricKind::Gauge,
        MetricKind::Histogram,
        MetricKind::Summary,
    ];

    pub fn flag(self) -> MetricKinds {
        match self {
            MetricKind::Counter => MetricKinds::COUNTER,
            MetricKind::Gauge => MetricKinds::GAUGE,
            MetricKind::Histogram => MetricKinds::HISTOGRAM,
            MetricKind::Summary => MetricKinds::SUMMARY,
        }
    }

    /// Second half of the composite instrument key
    pub fn tail(self) -> &'static str {
        match self {
            MetricKind::Counter => COUNTER_TAIL,
            MetricKind::Gauge => GAUGE_TAIL,
            MetricKind::Histogram => HISTOGRAM_TAIL,
            MetricKind::Summary => SUMMARY_TAIL,
        }
    }

    /// Appended to the configured metric name
    pub fn suffix(self) -> &'static str {
        match self {
            MetricKind::Counter => COUNTER_SUFFIX,
            MetricKind::Gauge => GAUGE_SUFFIX,
            MetricKind::Histogram => HISTOGRAM_SUFFIX,
            MetricKind::Summary => SUMMARY_SUFFIX,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_bits_yield_no_kinds() {
        let kinds = MetricKinds::from_config_bits(0).unwrap();
        assert_eq!(kinds.kinds().count(), 0);
    }

    #[test]
    fn test_counter_histogram() {
        let kinds = MetricKinds::from_config_bits(5).unwrap();
        assert_eq!(
            kinds.kinds().collect::<Vec<_>>(),
            vec![MetricKind::Counter, MetricKind::Histogram]
        );
    }

    #[test]
    fn test_all_four() {
        let kinds = MetricKinds::from_config_bits(15).unwrap();
        assert_eq!(kinds.kinds().collect::<Vec<_>>(), MetricKind::ALL.to_vec());
    }

    #[test]
    fn test_unknown_bits_rejected() {
        assert!(matches!(
            MetricKinds::from_config_bits(16),
            Err(NamespaceError::InvalidMetricKinds(16))
        ));
    }

    #[test]
    fn test_tails_and_suffixes() {
        assert_eq!(MetricKind::Counter.tail(), "count");
        assert_eq!(MetricKind::Histogram.tail(), "hist");
        assert_eq!(MetricKind::Gauge.suffix(), "_gauge");
        assert_eq!(MetricKind::Summary.to_string(), "summary");
    }
}
