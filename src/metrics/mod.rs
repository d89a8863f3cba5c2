//! Instrument registry for one namespace
//!
//! A [`Collection`] owns every instrument created for a compiled namespace:
//! the request counter, the parse error counter, and the per-field instruments
//! keyed by `(field, kind)`. Instruments are registered with the collection's
//! own [`Registry`] and can be registered into a shared one for exposition.

mod builder;
pub mod summary;

pub use builder::{label_sets, LabelSets};
pub use summary::{Summary, SummaryOpts, SummaryVec};

use std::collections::BTreeMap;
use std::fmt;

use prometheus::core::Collector;
use prometheus::{Counter, CounterVec, Encoder, GaugeVec, HistogramVec, Registry, TextEncoder};
use serde::Serialize;
use tracing::warn;

use crate::constants::KEY_SEPARATOR;
use crate::error::{NamespaceError, Result};
use crate::namespace::{CompiledNamespace, MetricKind, NamespaceConfig};
use crate::relabeling::{merged_targets, RelabelAdapter, RelabelTarget, StandardRelabelings};

/// Composite key of a per-field instrument
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentKey {
    pub field: String,
    pub kind: MetricKind,
}

impl InstrumentKey {
    pub fn new(field: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, KEY_SEPARATOR, self.kind.tail())
    }
}

/// Handle to one per-field instrument
#[derive(Clone)]
pub enum Instrument {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
    Summary(SummaryVec),
}

impl Instrument {
    pub fn kind(&self) -> MetricKind {
        match self {
            Instrument::Counter(_) => MetricKind::Counter,
            Instrument::Gauge(_) => MetricKind::Gauge,
            Instrument::Histogram(_) => MetricKind::Histogram,
            Instrument::Summary(_) => MetricKind::Summary,
        }
    }

    pub fn as_counter(&self) -> Option<&CounterVec> {
        match self {
            Instrument::Counter(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&GaugeVec> {
        match self {
            Instrument::Gauge(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&HistogramVec> {
        match self {
            Instrument::Histogram(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_summary(&self) -> Option<&SummaryVec> {
        match self {
            Instrument::Summary(v) => Some(v),
            _ => None,
        }
    }

    /// Fully-qualified metric name
    pub fn name(&self) -> String {
        self.with_collector(desc_name)
    }

    /// Label names values must be supplied for, in order
    pub fn label_names(&self) -> Vec<String> {
        self.with_collector(|c| {
            c.desc()
                .first()
                .map(|d| d.variable_labels.clone())
                .unwrap_or_default()
        })
    }

    fn with_collector<T>(&self, f: impl FnOnce(&dyn Collector) -> T) -> T {
        match self {
            Instrument::Counter(v) => f(v),
            Instrument::Gauge(v) => f(v),
            Instrument::Histogram(v) => f(v),
            Instrument::Summary(v) => f(v),
        }
    }

    fn boxed(&self) -> Box<dyn Collector> {
        match self {
            Instrument::Counter(v) => Box::new(v.clone()),
            Instrument::Gauge(v) => Box::new(v.clone()),
            Instrument::Histogram(v) => Box::new(v.clone()),
            Instrument::Summary(v) => Box::new(v.clone()),
        }
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

/// One line of a collection's inventory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentInfo {
    pub key: String,
    pub name: String,
    pub kind: String,
    pub label_names: Vec<String>,
}

/// All instruments built for one namespace
pub struct Collection {
    pub namespace: String,
    pub count_total: CounterVec,
    pub parse_errors_total: Counter,
    pub others_metrics: BTreeMap<InstrumentKey, Instrument>,
    /// Labels of the per-field instruments
    pub label_names: Vec<String>,
    /// Labels of `count_total`
    pub counter_label_names: Vec<String>,
    registry: Registry,
}

impl Collection {
    /// Builds the instruments of a compiled namespace from already merged relabel targets
    pub fn build(namespace: &CompiledNamespace, targets: &[RelabelTarget]) -> Result<Self> {
        builder::build(namespace, targets)
    }

    /// Compiles, merges relabel targets through `adapter`, then builds
    pub fn try_init(config: NamespaceConfig, adapter: &dyn RelabelAdapter) -> Result<Self> {
        let compiled = config.compile()?;
        let targets = merged_targets(adapter, &compiled.relabel_configs);
        Self::build(&compiled, &targets)
    }

    /// Startup entry point; panics when the namespace cannot be compiled or built
    pub fn init(config: NamespaceConfig) -> Self {
        let compiled = config.must_compile();
        let targets = merged_targets(&StandardRelabelings, &compiled.relabel_configs);
        match Self::build(&compiled, &targets) {
            Ok(collection) => collection,
            Err(e) => panic!("namespace '{}' failed to build: {}", compiled.name, e),
        }
    }

    pub fn get(&self, field: &str, kind: MetricKind) -> Option<&Instrument> {
        self.others_metrics.get(&InstrumentKey::new(field, kind))
    }

    pub fn counter(&self, field: &str) -> Option<&CounterVec> {
        self.get(field, MetricKind::Counter).and_then(Instrument::as_counter)
    }

    pub fn gauge(&self, field: &str) -> Option<&GaugeVec> {
        self.get(field, MetricKind::Gauge).and_then(Instrument::as_gauge)
    }

    pub fn histogram(&self, field: &str) -> Option<&HistogramVec> {
        self.get(field, MetricKind::Histogram).and_then(Instrument::as_histogram)
    }

    pub fn summary(&self, field: &str) -> Option<&SummaryVec> {
        self.get(field, MetricKind::Summary).and_then(Instrument::as_summary)
    }

    /// Registry holding exactly this namespace's instruments
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers every instrument into a shared registry.
    ///
    /// All or nothing: on failure the instruments registered so far are removed again.
    pub fn register_into(&self, registry: &Registry) -> Result<()> {
        for (index, collector) in self.collectors().into_iter().enumerate() {
            let name = desc_name(collector.as_ref());
            if let Err(e) = registry.register(collector) {
                for done in self.collectors().into_iter().take(index) {
                    let done_name = desc_name(done.as_ref());
                    if let Err(e) = registry.unregister(done) {
                        warn!(
                            namespace = %self.namespace,
                            "Rollback could not unregister {}: {}", done_name, e
                        );
                    }
                }
                return Err(NamespaceError::creation(name, e));
            }
        }
        Ok(())
    }

    /// Text exposition of the current values
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(NamespaceError::Exposition)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn inventory(&self) -> Vec<InstrumentInfo> {
        let mut infos = vec![
            InstrumentInfo {
                key: crate::constants::COUNT_TOTAL_NAME.to_string(),
                name: desc_name(&self.count_total),
                kind: MetricKind::Counter.to_string(),
                label_names: self.counter_label_names.clone(),
            },
            InstrumentInfo {
                key: crate::constants::PARSE_ERRORS_TOTAL_NAME.to_string(),
                name: desc_name(&self.parse_errors_total),
                kind: MetricKind::Counter.to_string(),
                label_names: Vec::new(),
            },
        ];

        infos.extend(self.others_metrics.iter().map(|(key, instrument)| InstrumentInfo {
            key: key.to_string(),
            name: instrument.name(),
            kind: instrument.kind().to_string(),
            label_names: instrument.label_names(),
        }));
        infos
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        let mut collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(self.count_total.clone()),
            Box::new(self.parse_errors_total.clone()),
        ];
        collectors.extend(self.others_metrics.values().map(Instrument::boxed));
        collectors
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace)
            .field("counter_label_names", &self.counter_label_names)
            .field("label_names", &self.label_names)
            .field("others_metrics", &self.others_metrics)
            .finish_non_exhaustive()
    }
}

fn desc_name(collector: &dyn Collector) -> String {
    collector
        .desc()
        .first()
        .map(|d| d.fq_name.clone())
        .unwrap_or_default()
}
