//! Namespace descriptors
//!
//! A namespace is one configured log source together with the labels,
//! relabel rules and per-field metric definitions that apply to it. The
//! decoded descriptor is turned into a [`CompiledNamespace`] by
//! [`NamespaceConfig::compile`] before any instrument is created from it.

mod compile;
mod kinds;

pub use compile::{CompiledNamespace, Deprecation};
pub use kinds::{MetricKind, MetricKinds};

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::constants::DEFAULT_OBJECTIVES;
use crate::relabeling::RelabelConfig;

/// Single metric namespace as decoded from configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NamespaceConfig {
    pub name: String,

    /// When set, every instrument carries `{namespace_label: name}` as a constant label
    #[serde(rename = "namespace_label", default)]
    pub namespace_label_name: String,
    #[serde(skip)]
    pub namespace_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub metrics_override: Option<MetricsOverride>,
    #[serde(skip)]
    pub namespace_prefix: String,

    /// Deprecated in favour of `source.files`
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(rename = "source", default)]
    pub source_data: SourceData,

    #[serde(default)]
    pub parser: String,
    #[serde(default)]
    pub format: String,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(rename = "relabel", default)]
    pub relabel_configs: Vec<RelabelConfig>,

    /// Buckets for the namespace-level latency histogram owned by the log processor
    #[serde(default)]
    pub histogram_buckets: Vec<f64>,

    #[serde(default)]
    pub print_log: bool,

    #[serde(skip)]
    pub ordered_label_names: Vec<String>,
    #[serde(skip)]
    pub ordered_label_values: Vec<String>,

    /// Extra instruments keyed by parsed log field
    #[serde(default)]
    pub others_metrics: BTreeMap<String, MetricsInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetricsOverride {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourceData {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub syslog: Option<SyslogSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyslogSource {
    pub listen_address: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Instruments derived from one parsed log field
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetricsInfo {
    pub metrics_name: String,

    #[serde(default)]
    pub metrics_help: String,

    /// 1: counter, 2: gauge, 4: histogram, 8: summary; any combination, 0 for none
    #[serde(default, deserialize_with = "MetricKinds::deserialize_bits")]
    pub metrics_type: MetricKinds,

    /// Histogram only. Empty leaves the instrument library's default buckets in place.
    #[serde(default)]
    pub histogram_buckets: Vec<f64>,

    /// Summary only. Zero keeps the default sliding window.
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub max_age: Duration,

    /// Summary only. `(quantile, allowed error)` pairs sorted by quantile.
    #[serde(default, deserialize_with = "deserialize_objectives")]
    pub objectives: Vec<(f64, f64)>,
}

impl MetricsInfo {
    pub fn new(metrics_name: impl Into<String>, metrics_type: MetricKinds) -> Self {
        Self {
            metrics_name: metrics_name.into(),
            metrics_type,
            ..Self::default()
        }
    }

    /// Objectives to hand to the summary instrument
    pub fn effective_objectives(&self) -> Vec<(f64, f64)> {
        if self.objectives.is_empty() {
            DEFAULT_OBJECTIVES.to_vec()
        } else {
            self.objectives.clone()
        }
    }
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(serde::de::Error::custom(format!(
            "max_age must be a non-negative number of seconds, got {}",
            secs
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| {
        serde::de::Error::custom(format!("max_age of {} seconds is out of range: {}", secs, e))
    })
}

// TOML keys are strings, so quantiles arrive as "0.5" = 0.05
fn deserialize_objectives<'de, D>(deserializer: D) -> Result<Vec<(f64, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
    let mut objectives = raw
        .into_iter()
        .map(|(quantile, error)| {
            quantile
                .trim()
                .parse::<f64>()
                .map(|q| (q, error))
                .map_err(|e| serde::de::Error::custom(format!("invalid quantile '{}': {}", quantile, e)))
        })
        .collect::<Result<Vec<_>, D::Error>>()?;
    objectives.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(objectives)
}
