//! Instrument construction for a compiled namespace
//!
//! Per-field instruments are labeled with the ordered static labels plus every
//! relabel target that is not counter-only; the request counter gets every
//! relabel target. Each generated name is claimed before the instrument is
//! created, so two definitions resolving to the same metric fail the build
//! instead of shadowing one another.

use std::collections::{BTreeMap, HashMap};

use prometheus::{Counter, CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use tracing::{debug, info};

use super::summary::{SummaryOpts, SummaryVec};
use super::{Collection, Instrument, InstrumentKey};
use crate::constants::{
    COUNT_TOTAL_HELP, COUNT_TOTAL_NAME, PARSE_ERRORS_TOTAL_HELP, PARSE_ERRORS_TOTAL_NAME,
};
use crate::error::{NamespaceError, Result};
use crate::namespace::{CompiledNamespace, MetricKind, MetricsInfo};
use crate::relabeling::RelabelTarget;

/// Label schemas shared by a namespace's instruments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSets {
    /// Static labels followed by every relabel target
    pub counter: Vec<String>,
    /// Static labels followed by the targets that are not counter-only
    pub values: Vec<String>,
}

/// Derives both label schemas; static labels keep their sorted order, targets their adapter order
pub fn label_sets(ordered_label_names: &[String], targets: &[RelabelTarget]) -> LabelSets {
    let mut counter = ordered_label_names.to_vec();
    let mut values = ordered_label_names.to_vec();

    for target in targets {
        if !target.only_counter {
            values.push(target.target_label.clone());
        }
        counter.push(target.target_label.clone());
    }

    LabelSets { counter, values }
}

/// Fully-qualified names already taken in this namespace, and by whom
#[derive(Default)]
struct NameClaims {
    owners: HashMap<String, String>,
}

impl NameClaims {
    fn claim(&mut self, fq_name: String, owner: String) -> Result<()> {
        if let Some(first) = self.owners.get(&fq_name) {
            return Err(NamespaceError::InstrumentNameCollision {
                name: fq_name,
                first: first.clone(),
                second: owner,
            });
        }
        self.owners.insert(fq_name, owner);
        Ok(())
    }
}

struct Builder<'a> {
    namespace: &'a CompiledNamespace,
    const_labels: HashMap<String, String>,
    registry: Registry,
    claims: NameClaims,
}

impl<'a> Builder<'a> {
    fn new(namespace: &'a CompiledNamespace) -> Self {
        Self {
            namespace,
            const_labels: namespace
                .namespace_labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            registry: Registry::new(),
            claims: NameClaims::default(),
        }
    }

    fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help)
            .namespace(self.namespace.namespace_prefix.clone())
            .const_labels(self.const_labels.clone())
    }

    fn register<C>(&self, name: &str, collector: &C) -> Result<()>
    where
        C: prometheus::core::Collector + Clone + 'static,
    {
        self.registry
            .register(Box::new(collector.clone()))
            .map_err(|e| NamespaceError::creation(name, e))
    }

    fn count_total(&mut self, labels: &[&str]) -> Result<CounterVec> {
        let opts = self.opts(COUNT_TOTAL_NAME, COUNT_TOTAL_HELP);
        let fq_name = opts.fq_name();
        self.claims
            .claim(fq_name.clone(), "the namespace request counter".to_string())?;

        let counter = CounterVec::new(opts, labels).map_err(|e| NamespaceError::creation(&fq_name, e))?;
        self.register(&fq_name, &counter)?;
        Ok(counter)
    }

    fn parse_errors_total(&mut self) -> Result<Counter> {
        let opts = self.opts(PARSE_ERRORS_TOTAL_NAME, PARSE_ERRORS_TOTAL_HELP);
        let fq_name = opts.fq_name();
        self.claims
            .claim(fq_name.clone(), "the namespace parse error counter".to_string())?;

        let counter = Counter::with_opts(opts).map_err(|e| NamespaceError::creation(&fq_name, e))?;
        self.register(&fq_name, &counter)?;
        Ok(counter)
    }

    fn field_instrument(
        &mut self,
        key: &InstrumentKey,
        info: &MetricsInfo,
        labels: &[&str],
    ) -> Result<Instrument> {
        let name = format!("{}{}", info.metrics_name, key.kind.suffix());
        // the instrument library refuses an empty help string
        let help = if info.metrics_help.is_empty() {
            info.metrics_name.as_str()
        } else {
            info.metrics_help.as_str()
        };

        let opts = self.opts(&name, help);
        let fq_name = opts.fq_name();
        self.claims
            .claim(fq_name.clone(), format!("field '{}' ({})", key.field, key.kind))?;

        let creation = |e: prometheus::Error| NamespaceError::creation(&fq_name, e);
        let instrument = match key.kind {
            MetricKind::Counter => {
                let vec = CounterVec::new(opts, labels).map_err(creation)?;
                self.register(&fq_name, &vec)?;
                Instrument::Counter(vec)
            }
            MetricKind::Gauge => {
                let vec = GaugeVec::new(opts, labels).map_err(creation)?;
                self.register(&fq_name, &vec)?;
                Instrument::Gauge(vec)
            }
            MetricKind::Histogram => {
                let mut hist_opts = HistogramOpts::from(opts);
                if !info.histogram_buckets.is_empty() {
                    hist_opts = hist_opts.buckets(info.histogram_buckets.clone());
                }
                let vec = HistogramVec::new(hist_opts, labels).map_err(creation)?;
                self.register(&fq_name, &vec)?;
                Instrument::Histogram(vec)
            }
            MetricKind::Summary => {
                let summary_opts = SummaryOpts::new(name.as_str(), help)
                    .namespace(self.namespace.namespace_prefix.clone())
                    .const_labels(self.const_labels.clone())
                    .objectives(info.effective_objectives())
                    .max_age(info.max_age);
                let vec = SummaryVec::new(summary_opts, labels).map_err(creation)?;
                self.register(&fq_name, &vec)?;
                Instrument::Summary(vec)
            }
        };

        debug!(namespace = %self.namespace.name, key = %key, name = %fq_name, "Created instrument");
        Ok(instrument)
    }
}

pub(super) fn build(namespace: &CompiledNamespace, targets: &[RelabelTarget]) -> Result<Collection> {
    let sets = label_sets(&namespace.ordered_label_names, targets);
    let counter_labels: Vec<&str> = sets.counter.iter().map(String::as_str).collect();
    let value_labels: Vec<&str> = sets.values.iter().map(String::as_str).collect();

    let mut builder = Builder::new(namespace);
    let count_total = builder.count_total(&counter_labels)?;
    let parse_errors_total = builder.parse_errors_total()?;

    let mut others_metrics = BTreeMap::new();
    for (field, info) in &namespace.others_metrics {
        for kind in info.metrics_type.kinds() {
            let key = InstrumentKey::new(field.clone(), kind);
            let instrument = builder.field_instrument(&key, info, &value_labels)?;
            others_metrics.insert(key, instrument);
        }
    }

    info!(
        namespace = %namespace.name,
        prefix = %namespace.namespace_prefix,
        counter_labels = ?sets.counter,
        labels = ?sets.values,
        instruments = others_metrics.len() + 2,
        "Built namespace instruments"
    );

    Ok(Collection {
        namespace: namespace.name.clone(),
        count_total,
        parse_errors_total,
        others_metrics,
        label_names: sets.values,
        counter_label_names: sets.counter,
        registry: builder.registry,
    })
}
