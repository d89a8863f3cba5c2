//! Namespace compilation
//!
//! Compilation runs, in order: deprecation resolution, glob expansion,
//! relabel rule compilation, constant-label derivation, label ordering and
//! prefix derivation. Each step is idempotent, so compiling the result of a
//! previous compilation yields an equal descriptor.

use std::fmt;
use std::ops::Deref;

use tracing::{debug, info, warn};

use super::NamespaceConfig;
use crate::constants::GLOB_WILDCARD;
use crate::error::{NamespaceError, Result};

/// A deprecated setting found in a namespace. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deprecation {
    pub setting: &'static str,
    pub replacement: &'static str,
}

impl fmt::Display for Deprecation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "you are using the '{}' configuration parameter, use '{}' instead",
            self.setting, self.replacement
        )
    }
}

/// A namespace that went through [`NamespaceConfig::compile`]
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledNamespace(NamespaceConfig);

impl CompiledNamespace {
    pub fn into_inner(self) -> NamespaceConfig {
        self.0
    }
}

impl Deref for CompiledNamespace {
    type Target = NamespaceConfig;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl NamespaceConfig {
    /// Deprecated settings used by this namespace
    pub fn deprecation_warnings(&self) -> Vec<Deprecation> {
        let mut warnings = Vec::new();
        if !self.source_files.is_empty() {
            warnings.push(Deprecation {
                setting: "source_files",
                replacement: "source.files",
            });
        }
        warnings
    }

    /// Copies values of deprecated fields into their current counterparts
    pub fn resolve_deprecations(&mut self) {
        if !self.source_files.is_empty() {
            self.source_data.files = self.source_files.clone();
        }
    }

    /// Expands glob patterns in the file sources into the matching paths.
    ///
    /// Entries without a wildcard pass through unchanged. The expanded list
    /// replaces both `source.files` and the legacy `source_files`.
    pub fn resolve_globs(&mut self) -> Result<()> {
        if self.source_data.files.is_empty() {
            return Ok(());
        }

        let mut resolved = Vec::with_capacity(self.source_data.files.len());
        for source in &self.source_data.files {
            if !source.contains(GLOB_WILDCARD) {
                warn!(namespace = %self.name, "No globs for {}", source);
                resolved.push(source.clone());
                continue;
            }

            let paths = glob::glob(source).map_err(|e| NamespaceError::GlobExpansion {
                pattern: source.clone(),
                source: e,
            })?;

            let mut matches = Vec::new();
            for entry in paths {
                match entry {
                    Ok(path) => matches.push(path.to_string_lossy().into_owned()),
                    Err(e) => debug!(namespace = %self.name, "Skipping unreadable glob entry: {}", e),
                }
            }

            info!(namespace = %self.name, "Resolved globs {} to {:?}", source, matches);
            resolved.extend(matches);
        }

        self.source_files = resolved.clone();
        self.source_data.files = resolved;
        Ok(())
    }

    /// Compiles every relabel rule, stopping at the first failure
    pub fn compile_relabelings(&mut self) -> Result<()> {
        for (index, relabel) in self.relabel_configs.iter_mut().enumerate() {
            relabel
                .compile()
                .map_err(|source| NamespaceError::RelabelCompile {
                    index,
                    target_label: relabel.target_label.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Builds the constant `{namespace_label: name}` mapping, if configured
    pub fn derive_namespace_labels(&mut self) {
        self.namespace_labels.clear();
        if !self.namespace_label_name.is_empty() {
            self.namespace_labels
                .insert(self.namespace_label_name.clone(), self.name.clone());
        }
    }

    /// Builds two parallel lists of label names and values, ordered by label name
    pub fn order_labels(&mut self) {
        let mut names: Vec<String> = self.labels.keys().cloned().collect();
        names.sort_unstable();

        self.ordered_label_values = names
            .iter()
            .map(|name| self.labels[name].clone())
            .collect();
        self.ordered_label_names = names;
    }

    /// Prefix for every instrument name: the override prefix if set, else the namespace name
    pub fn derive_prefix(&mut self) -> Result<()> {
        let prefix = match &self.metrics_override {
            Some(over) if !over.prefix.is_empty() => over.prefix.clone(),
            _ => self.name.clone(),
        };

        if prefix.is_empty() {
            return Err(NamespaceError::Config(
                "namespace has neither a name nor a metrics_override prefix".to_string(),
            ));
        }

        self.namespace_prefix = prefix;
        Ok(())
    }

    /// Normalizes the namespace for instrument construction.
    ///
    /// On failure the descriptor is consumed; nothing partially compiled escapes.
    pub fn compile(mut self) -> Result<CompiledNamespace> {
        for deprecation in self.deprecation_warnings() {
            warn!(namespace = %self.name, "{}", deprecation);
        }

        self.resolve_deprecations();
        self.resolve_globs()?;
        self.compile_relabelings()?;
        self.derive_namespace_labels();
        self.order_labels();
        self.derive_prefix()?;

        debug!(
            namespace = %self.name,
            prefix = %self.namespace_prefix,
            labels = ?self.ordered_label_names,
            "Namespace compiled"
        );

        Ok(CompiledNamespace(self))
    }

    /// [`compile`](Self::compile) for startup paths that treat bad configuration as unrecoverable
    pub fn must_compile(self) -> CompiledNamespace {
        let name = self.name.clone();
        match self.compile() {
            Ok(compiled) => compiled,
            Err(e) => panic!("namespace '{}' failed to compile: {}", name, e),
        }
    }
}
