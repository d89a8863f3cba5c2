pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod namespace;
pub mod relabeling;

pub use bootstrap::{build_all, NamespaceFailure, NamespaceSet};
pub use config::Config;
pub use error::{NamespaceError, Result};
pub use metrics::{Collection, Instrument, InstrumentKey};
pub use namespace::{CompiledNamespace, MetricKind, MetricKinds, MetricsInfo, NamespaceConfig};
pub use relabeling::{RelabelAdapter, RelabelConfig, RelabelTarget, StandardRelabelings};
