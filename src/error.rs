use thiserror::Error;

#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    GlobExpansion {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("relabel rule #{index} (target label '{target_label}') failed to compile: {source}")]
    RelabelCompile {
        index: usize,
        target_label: String,
        #[source]
        source: regex::Error,
    },

    #[error("metrics_type {0} has bits outside counter|gauge|histogram|summary")]
    InvalidMetricKinds(u32),

    #[error("instrument '{name}' is generated by both {first} and {second}")]
    InstrumentNameCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("failed to create instrument '{name}': {source}")]
    InstrumentCreation {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("failed to encode text exposition: {0}")]
    Exposition(#[source] prometheus::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl NamespaceError {
    pub(crate) fn creation(name: impl Into<String>, source: prometheus::Error) -> Self {
        NamespaceError::InstrumentCreation {
            name: name.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, NamespaceError>;
