//! Relabel rule definitions and the target-label adapter
//!
//! A relabel rule derives one extra label from a parsed log line. This crate
//! never evaluates rules; it only compiles their definitions and needs to know
//! which label names they produce, and whether a label is restricted to the
//! namespace-wide request counter.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// One `relabel` block from a namespace
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelabelConfig {
    pub target_label: String,

    /// Parsed log field the label value is taken from
    #[serde(rename = "from", default)]
    pub source_value: String,

    #[serde(default)]
    pub whitelist: Vec<String>,

    #[serde(rename = "match", default)]
    pub matches: Vec<RelabelValueMatch>,

    /// When non-zero, the value is split on `separator` and the n-th (1-based) part is used
    #[serde(default)]
    pub split: usize,

    #[serde(default)]
    pub separator: String,

    /// Attach this label to the request counter only, never to per-field series
    #[serde(default)]
    pub only_counter: bool,

    #[serde(skip)]
    whitelist_set: Option<HashSet<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelabelValueMatch {
    #[serde(rename = "regex")]
    pub pattern: String,

    #[serde(default)]
    pub replacement: String,

    #[serde(skip)]
    pub(crate) compiled: Option<Regex>,
}

impl PartialEq for RelabelValueMatch {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.replacement == other.replacement
            && self.compiled.as_ref().map(Regex::as_str) == other.compiled.as_ref().map(Regex::as_str)
    }
}

impl PartialEq for RelabelConfig {
    fn eq(&self, other: &Self) -> bool {
        self.target_label == other.target_label
            && self.source_value == other.source_value
            && self.whitelist == other.whitelist
            && self.matches == other.matches
            && self.split == other.split
            && self.separator == other.separator
            && self.only_counter == other.only_counter
            && self.whitelist_set == other.whitelist_set
    }
}

impl RelabelConfig {
    pub fn new(target_label: impl Into<String>, source_value: impl Into<String>) -> Self {
        Self {
            target_label: target_label.into(),
            source_value: source_value.into(),
            ..Self::default()
        }
    }

    pub fn with_split(mut self, split: usize, separator: impl Into<String>) -> Self {
        self.split = split;
        self.separator = separator.into();
        self
    }

    pub fn counter_only(mut self) -> Self {
        self.only_counter = true;
        self
    }

    /// Builds the whitelist lookup and compiles every match expression.
    ///
    /// Recompiling an already compiled rule rebuilds the same state.
    pub fn compile(&mut self) -> Result<(), regex::Error> {
        for m in &mut self.matches {
            m.compiled = Some(Regex::new(&m.pattern)?);
        }

        self.whitelist_set = if self.whitelist.is_empty() {
            None
        } else {
            Some(self.whitelist.iter().cloned().collect())
        };

        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.matches.iter().all(|m| m.compiled.is_some())
            && (self.whitelist.is_empty() || self.whitelist_set.is_some())
    }

    /// Whether `value` passes the whitelist. Rules without a whitelist accept everything.
    pub fn whitelist_allows(&self, value: &str) -> bool {
        match &self.whitelist_set {
            Some(set) => set.contains(value),
            None => self.whitelist.is_empty(),
        }
    }

    /// Compiled match expressions with their replacements, in declaration order
    pub fn compiled_matches(&self) -> impl Iterator<Item = (&Regex, &str)> {
        self.matches
            .iter()
            .filter_map(|m| m.compiled.as_ref().map(|re| (re, m.replacement.as_str())))
    }

    pub fn target(&self) -> RelabelTarget {
        RelabelTarget {
            target_label: self.target_label.clone(),
            only_counter: self.only_counter,
        }
    }
}

/// Label name produced by a relabel rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelabelTarget {
    pub target_label: String,
    pub only_counter: bool,
}

impl RelabelTarget {
    pub fn new(target_label: impl Into<String>, only_counter: bool) -> Self {
        Self {
            target_label: target_label.into(),
            only_counter,
        }
    }
}

/// Rules every namespace gets after its own
pub static DEFAULT_RELABEL_CONFIGS: Lazy<Vec<RelabelConfig>> = Lazy::new(|| {
    vec![
        RelabelConfig::new("method", "request").with_split(1, " "),
        RelabelConfig::new("status", "status"),
    ]
});

/// Boundary to the relabel rule engine
pub trait RelabelAdapter: Send + Sync {
    /// Targets produced by a namespace's own rules, in rule order
    fn rules_for(&self, configs: &[RelabelConfig]) -> Vec<RelabelTarget>;

    /// Targets appended after the namespace rules
    fn defaults(&self) -> Vec<RelabelTarget>;

    fn dedupe(&self, targets: Vec<RelabelTarget>) -> Vec<RelabelTarget> {
        unique_targets(targets)
    }
}

/// Adapter backed by [`DEFAULT_RELABEL_CONFIGS`]
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardRelabelings;

impl RelabelAdapter for StandardRelabelings {
    fn rules_for(&self, configs: &[RelabelConfig]) -> Vec<RelabelTarget> {
        configs.iter().map(RelabelConfig::target).collect()
    }

    fn defaults(&self) -> Vec<RelabelTarget> {
        DEFAULT_RELABEL_CONFIGS.iter().map(RelabelConfig::target).collect()
    }
}

/// Namespace rules, then defaults, with later duplicates dropped
pub fn merged_targets(adapter: &dyn RelabelAdapter, configs: &[RelabelConfig]) -> Vec<RelabelTarget> {
    let mut targets = adapter.rules_for(configs);
    targets.extend(adapter.defaults());
    adapter.dedupe(targets)
}

/// Keeps the first occurrence of every target label, position and flag included
pub fn unique_targets(targets: Vec<RelabelTarget>) -> Vec<RelabelTarget> {
    let mut seen = HashSet::with_capacity(targets.len());
    targets
        .into_iter()
        .filter(|t| seen.insert(t.target_label.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_targets_keeps_first_flag() {
        let targets = vec![
            RelabelTarget::new("A", false),
            RelabelTarget::new("B", true),
            RelabelTarget::new("A", true),
            RelabelTarget::new("A", false),
        ];

        assert_eq!(
            unique_targets(targets),
            vec![RelabelTarget::new("A", false), RelabelTarget::new("B", true)]
        );
    }

    #[test]
    fn test_merged_targets_appends_defaults() {
        let configs = vec![
            RelabelConfig::new("upstream", "upstream_addr"),
            RelabelConfig::new("status", "status").counter_only(),
        ];

        let merged = merged_targets(&StandardRelabelings, &configs);
        assert_eq!(
            merged,
            vec![
                RelabelTarget::new("upstream", false),
                RelabelTarget::new("status", true),
                RelabelTarget::new("method", false),
            ]
        );
    }

    #[test]
    fn test_compile_builds_matches_and_whitelist() {
        let mut rule = RelabelConfig::new("path", "request");
        rule.whitelist = vec!["/health".to_string()];
        rule.matches = vec![RelabelValueMatch {
            pattern: r"^/users/\d+$".to_string(),
            replacement: "/users/:id".to_string(),
            ..Default::default()
        }];

        assert!(!rule.is_compiled());
        rule.compile().unwrap();
        assert!(rule.is_compiled());
        assert!(rule.whitelist_allows("/health"));
        assert!(!rule.whitelist_allows("/admin"));

        let (re, replacement) = rule.compiled_matches().next().unwrap();
        assert!(re.is_match("/users/42"));
        assert_eq!(replacement, "/users/:id");
    }

    #[test]
    fn test_compile_rejects_bad_regex() {
        let mut rule = RelabelConfig::new("path", "request");
        rule.matches = vec![RelabelValueMatch {
            pattern: "(unclosed".to_string(),
            ..Default::default()
        }];

        assert!(rule.compile().is_err());
    }

    #[test]
    fn test_recompile_is_stable() {
        let mut rule = RelabelConfig::new("path", "request");
        rule.matches = vec![RelabelValueMatch {
            pattern: "^/a".to_string(),
            ..Default::default()
        }];
        rule.compile().unwrap();
        let first = rule.clone();
        rule.compile().unwrap();
        assert_eq!(first, rule);
    }
}
