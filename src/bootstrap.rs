//! Startup of every configured namespace
//!
//! Namespaces are compiled and built independently. One that fails is left
//! out entirely and reported; the others are still registered into the
//! shared registry handed to the exposition layer.

use prometheus::Registry;
use tracing::{error, info};

use crate::config::Config;
use crate::error::NamespaceError;
use crate::metrics::Collection;
use crate::relabeling::RelabelAdapter;

#[derive(Debug)]
pub struct NamespaceFailure {
    pub namespace: String,
    pub error: NamespaceError,
}

/// Namespaces that made it through startup, and the ones that did not
pub struct NamespaceSet {
    pub collections: Vec<Collection>,
    pub failures: Vec<NamespaceFailure>,
    registry: Registry,
}

impl NamespaceSet {
    /// Registry holding the instruments of every successful namespace
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn get(&self, namespace: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.namespace == namespace)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn build_all(config: Config, adapter: &dyn RelabelAdapter) -> NamespaceSet {
    let registry = Registry::new();
    let mut collections = Vec::with_capacity(config.namespaces.len());
    let mut failures = Vec::new();

    for namespace in config.namespaces {
        let name = namespace.name.clone();
        let built = Collection::try_init(namespace, adapter)
            .and_then(|collection| collection.register_into(&registry).map(|_| collection));

        match built {
            Ok(collection) => {
                info!(namespace = %name, instruments = collection.others_metrics.len() + 2, "Namespace ready");
                collections.push(collection);
            }
            Err(e) => {
                error!(namespace = %name, "Namespace excluded: {}", e);
                failures.push(NamespaceFailure {
                    namespace: name,
                    error: e,
                });
            }
        }
    }

    NamespaceSet {
        collections,
        failures,
        registry,
    }
}
