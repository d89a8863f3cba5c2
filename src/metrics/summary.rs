//! Labeled summary instrument
//!
//! Each series keeps a sliding window of observations as a ring of CKMS
//! sketches started one age bucket apart. The oldest live sketch covers the
//! whole window and answers quantile queries. Sketches are sized by the
//! tightest error among the configured objectives.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use prometheus::core::{Collector, Desc};
use prometheus::Opts;
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType, Quantile};
use quantiles::ckms::CKMS;

use crate::constants::{DEFAULT_OBJECTIVES, DEFAULT_SUMMARY_AGE_BUCKETS, DEFAULT_SUMMARY_MAX_AGE_SECS};

const QUANTILE_LABEL: &str = "quantile";

#[derive(Clone, Debug)]
pub struct SummaryOpts {
    pub common_opts: Opts,
    /// `(quantile, allowed error)` pairs
    pub objectives: Vec<(f64, f64)>,
    pub max_age: Duration,
    pub age_buckets: usize,
}

impl SummaryOpts {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, help: S2) -> Self {
        Self {
            common_opts: Opts::new(name, help),
            objectives: DEFAULT_OBJECTIVES.to_vec(),
            max_age: Duration::from_secs(DEFAULT_SUMMARY_MAX_AGE_SECS),
            age_buckets: DEFAULT_SUMMARY_AGE_BUCKETS,
        }
    }

    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.common_opts = self.common_opts.namespace(namespace);
        self
    }

    pub fn const_labels(mut self, const_labels: HashMap<String, String>) -> Self {
        self.common_opts = self.common_opts.const_labels(const_labels);
        self
    }

    pub fn objectives(mut self, objectives: Vec<(f64, f64)>) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn fq_name(&self) -> String {
        self.common_opts.fq_name()
    }
}

/// Rank error every sketch must honor so each objective holds
fn sketch_error(objectives: &[(f64, f64)]) -> f64 {
    let objectives = if objectives.is_empty() {
        &DEFAULT_OBJECTIVES[..]
    } else {
        objectives
    };
    objectives
        .iter()
        .map(|(_, error)| *error)
        .fold(f64::INFINITY, f64::min)
}

/// Summary partitioned by label values
#[derive(Clone)]
pub struct SummaryVec {
    core: Arc<SummaryVecCore>,
}

struct SummaryVecCore {
    desc: Desc,
    objectives: Vec<(f64, f64)>,
    max_age: Duration,
    age_buckets: usize,
    sketch_error: f64,
    children: RwLock<HashMap<Vec<String>, Summary>>,
}

impl SummaryVec {
    pub fn new(opts: SummaryOpts, label_names: &[&str]) -> prometheus::Result<Self> {
        if label_names.contains(&QUANTILE_LABEL)
            || opts.common_opts.const_labels.contains_key(QUANTILE_LABEL)
        {
            return Err(prometheus::Error::Msg(format!(
                "\"{}\" is not allowed as label name in summaries",
                QUANTILE_LABEL
            )));
        }

        for &(quantile, error) in &opts.objectives {
            if !(0.0..=1.0).contains(&quantile) || !(0.0..=1.0).contains(&error) {
                return Err(prometheus::Error::Msg(format!(
                    "invalid summary objective {}: {}, quantile and error must be within [0, 1]",
                    quantile, error
                )));
            }
        }

        if opts.age_buckets == 0 {
            return Err(prometheus::Error::Msg(
                "summary needs at least one age bucket".to_string(),
            ));
        }

        let desc = Desc::new(
            opts.common_opts.fq_name(),
            opts.common_opts.help.clone(),
            label_names.iter().map(|l| l.to_string()).collect(),
            opts.common_opts.const_labels.clone(),
        )?;

        let max_age = if opts.max_age.is_zero() {
            Duration::from_secs(DEFAULT_SUMMARY_MAX_AGE_SECS)
        } else {
            opts.max_age
        };

        let mut objectives = opts.objectives;
        objectives.sort_by(|a, b| a.0.total_cmp(&b.0));
        let sketch_error = sketch_error(&objectives);

        Ok(Self {
            core: Arc::new(SummaryVecCore {
                desc,
                objectives,
                max_age,
                age_buckets: opts.age_buckets,
                sketch_error,
                children: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn get_metric_with_label_values(&self, values: &[&str]) -> prometheus::Result<Summary> {
        let expect = self.core.desc.variable_labels.len();
        if values.len() != expect {
            return Err(prometheus::Error::InconsistentCardinality {
                expect,
                got: values.len(),
            });
        }

        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        if let Some(summary) = self
            .core
            .children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(summary.clone());
        }

        let mut children = self
            .core
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let summary = children
            .entry(key)
            .or_insert_with(|| {
                Summary::new(self.core.max_age, self.core.age_buckets, self.core.sketch_error)
            });
        Ok(summary.clone())
    }

    /// Panics on a label cardinality mismatch, like the library's other vectors
    pub fn with_label_values(&self, values: &[&str]) -> Summary {
        self.get_metric_with_label_values(values)
            .unwrap_or_else(|e| panic!("summary {}: {}", self.core.desc.fq_name, e))
    }

    pub fn objectives(&self) -> &[(f64, f64)] {
        &self.core.objectives
    }

    pub fn max_age(&self) -> Duration {
        self.core.max_age
    }

    fn collect_at(&self, now: Instant) -> MetricFamily {
        let desc = &self.core.desc;
        let children = self
            .core
            .children
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut series: Vec<(&Vec<String>, &Summary)> = children.iter().collect();
        series.sort_by(|a, b| a.0.cmp(b.0));

        let metrics: Vec<proto::Metric> = series
            .into_iter()
            .map(|(values, summary)| {
                let mut labels: Vec<LabelPair> = desc.const_label_pairs.clone();
                for (name, value) in desc.variable_labels.iter().zip(values) {
                    let mut pair = LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value.clone());
                    labels.push(pair);
                }
                labels.sort_by(|a, b| a.get_name().cmp(b.get_name()));

                let mut metric = proto::Metric::default();
                metric.set_label(labels.into());
                metric.set_summary(summary.snapshot(&self.core.objectives, now));
                metric
            })
            .collect();

        let mut family = MetricFamily::default();
        family.set_name(desc.fq_name.clone());
        family.set_help(desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);
        family.set_metric(metrics.into());
        family
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.core.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        vec![self.collect_at(Instant::now())]
    }
}

/// One summary series
#[derive(Clone)]
pub struct Summary {
    stream: Arc<Mutex<Stream>>,
}

impl Summary {
    fn new(max_age: Duration, age_buckets: usize, error: f64) -> Self {
        Self {
            stream: Arc::new(Mutex::new(Stream::new(
                max_age,
                age_buckets,
                error,
                Instant::now(),
            ))),
        }
    }

    pub fn observe(&self, value: f64) {
        self.observe_at(value, Instant::now());
    }

    pub fn get_sample_count(&self) -> u64 {
        self.lock().count
    }

    pub fn get_sample_sum(&self) -> f64 {
        self.lock().sum
    }

    /// Current estimate for `quantile` over the live window, NaN when empty
    pub fn quantile(&self, quantile: f64) -> f64 {
        self.quantile_at(quantile, Instant::now())
    }

    fn observe_at(&self, value: f64, now: Instant) {
        self.lock().observe(value, now);
    }

    fn quantile_at(&self, quantile: f64, now: Instant) -> f64 {
        let mut stream = self.lock();
        stream.rotate(now);
        stream.quantiles(&[quantile])[0]
    }

    fn snapshot(&self, objectives: &[(f64, f64)], now: Instant) -> proto::Summary {
        let mut stream = self.lock();
        stream.rotate(now);

        let wanted: Vec<f64> = objectives.iter().map(|(q, _)| *q).collect();
        let quantiles: Vec<Quantile> = wanted
            .iter()
            .zip(stream.quantiles(&wanted))
            .map(|(q, v)| {
                let mut quantile = Quantile::default();
                quantile.set_quantile(*q);
                quantile.set_value(v);
                quantile
            })
            .collect();

        let mut summary = proto::Summary::default();
        summary.set_sample_count(stream.count);
        summary.set_sample_sum(stream.sum);
        summary.set_quantile(quantiles.into());
        summary
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Stream> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Stream {
    count: u64,
    sum: f64,
    // oldest first; every observation lands in all of them and the front answers queries
    sketches: VecDeque<CKMS<f64>>,
    error: f64,
    bucket_width: Duration,
    max_buckets: usize,
    newest_started: Instant,
}

impl Stream {
    fn new(max_age: Duration, age_buckets: usize, error: f64, now: Instant) -> Self {
        let mut sketches = VecDeque::with_capacity(age_buckets + 1);
        sketches.push_back(CKMS::new(error));
        Self {
            count: 0,
            sum: 0.0,
            sketches,
            error,
            bucket_width: max_age / age_buckets as u32,
            max_buckets: age_buckets,
            newest_started: now,
        }
    }

    fn observe(&mut self, value: f64, now: Instant) {
        self.rotate(now);
        self.count += 1;
        self.sum += value;
        for sketch in self.sketches.iter_mut() {
            sketch.insert(value);
        }
    }

    fn rotate(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.newest_started);
        if elapsed < self.bucket_width {
            return;
        }

        if elapsed >= self.bucket_width * self.max_buckets as u32 {
            self.sketches.clear();
            self.sketches.push_back(CKMS::new(self.error));
            self.newest_started = now;
            return;
        }

        while now.saturating_duration_since(self.newest_started) >= self.bucket_width {
            self.newest_started += self.bucket_width;
            self.sketches.push_back(CKMS::new(self.error));
            while self.sketches.len() > self.max_buckets {
                self.sketches.pop_front();
            }
        }
    }

    fn quantiles(&self, wanted: &[f64]) -> Vec<f64> {
        let head = self.sketches.front();
        wanted
            .iter()
            .map(|q| {
                head.and_then(|sketch| sketch.query(*q))
                    .map_or(f64::NAN, |(_, value)| value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_vec(labels: &[&str]) -> SummaryVec {
        SummaryVec::new(
            SummaryOpts::new("bytes_summary", "Response bytes").namespace("edge"),
            labels,
        )
        .unwrap()
    }

    #[test]
    fn test_quantiles_over_observations() {
        let vec = summary_vec(&["method"]);
        let series = vec.with_label_values(&["GET"]);
        for v in 1..=100 {
            series.observe(v as f64);
        }

        assert_eq!(series.get_sample_count(), 100);
        assert_eq!(series.get_sample_sum(), 5050.0);
        for (q, expected) in [(0.5, 50.0), (0.9, 90.0), (0.99, 99.0)] {
            assert!((series.quantile(q) - expected).abs() <= 1.0, "q={}", q);
        }
    }

    #[test]
    fn test_quantiles_stay_within_objective_error() {
        const N: u64 = 100_000;
        let vec = summary_vec(&[]);
        let series = vec.with_label_values(&[]);
        // 7919 is coprime with N, so this visits 1..=N once in scrambled order
        for i in 0..N {
            series.observe(((i * 7919) % N + 1) as f64);
        }

        for &(q, error) in vec.objectives() {
            let value = series.quantile(q);
            let rank_error = (value - q * N as f64).abs() / N as f64;
            assert!(
                rank_error <= error + 1.0 / N as f64,
                "q={} value={} rank error {} exceeds {}",
                q,
                value,
                rank_error,
                error
            );
        }
    }

    #[test]
    fn test_sketch_error_is_tightest_objective() {
        assert_eq!(sketch_error(&[(0.5, 0.05), (0.75, 0.02)]), 0.02);
        assert_eq!(sketch_error(&[]), 0.001);
    }

    #[test]
    fn test_empty_series_reports_nan() {
        let vec = summary_vec(&[]);
        assert!(vec.with_label_values(&[]).quantile(0.5).is_nan());
    }

    #[test]
    fn test_window_expires_observations() {
        let vec = summary_vec(&[]);
        let series = vec.with_label_values(&[]);
        let start = Instant::now();
        series.observe_at(10.0, start);

        let later = start + vec.max_age() + Duration::from_secs(1);
        assert!(series.quantile_at(0.5, later).is_nan());
        // count and sum are cumulative
        assert_eq!(series.get_sample_count(), 1);
    }

    #[test]
    fn test_rotation_keeps_recent_buckets() {
        let vec = summary_vec(&[]);
        let series = vec.with_label_values(&[]);
        let start = Instant::now();
        let width = vec.max_age() / DEFAULT_SUMMARY_AGE_BUCKETS as u32;

        series.observe_at(1.0, start);
        series.observe_at(5.0, start + width * 2);
        assert_eq!(series.quantile_at(0.0, start + width * 3), 1.0);
        assert_eq!(series.quantile_at(0.0, start + width * 5), 5.0);
    }

    #[test]
    fn test_same_labels_share_series() {
        let vec = summary_vec(&["method"]);
        vec.with_label_values(&["GET"]).observe(1.0);
        vec.with_label_values(&["GET"]).observe(2.0);
        assert_eq!(vec.with_label_values(&["GET"]).get_sample_count(), 2);
    }

    #[test]
    fn test_cardinality_mismatch() {
        let vec = summary_vec(&["method", "status"]);
        assert!(matches!(
            vec.get_metric_with_label_values(&["GET"]),
            Err(prometheus::Error::InconsistentCardinality { expect: 2, got: 1 })
        ));
    }

    #[test]
    fn test_rejects_quantile_label_and_bad_objectives() {
        let opts = SummaryOpts::new("x_summary", "x");
        assert!(SummaryVec::new(opts.clone(), &["quantile"]).is_err());
        assert!(SummaryVec::new(opts.objectives(vec![(1.5, 0.01)]), &[]).is_err());
    }

    #[test]
    fn test_collect_reports_objectives() {
        let vec = summary_vec(&["method"]);
        vec.with_label_values(&["GET"]).observe(3.0);

        let families = vec.collect();
        assert_eq!(families.len(), 1);
        let family = &families[0];
        assert_eq!(family.get_name(), "edge_bytes_summary");
        assert_eq!(family.get_field_type(), MetricType::SUMMARY);

        let metric = &family.get_metric()[0];
        assert_eq!(metric.get_label()[0].get_name(), "method");
        let quantiles: Vec<f64> = metric
            .get_summary()
            .get_quantile()
            .iter()
            .map(|q| q.get_quantile())
            .collect();
        assert_eq!(quantiles, vec![0.5, 0.9, 0.99]);
        assert_eq!(metric.get_summary().get_sample_count(), 1);
    }
}
