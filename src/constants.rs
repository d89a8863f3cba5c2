// Instrument names and fixed values shared by the compiler and the builder

/// Namespace-wide request counter
pub const COUNT_TOTAL_NAME: &str = "http_response_count_total";
pub const COUNT_TOTAL_HELP: &str = "Amount of processed HTTP requests";

/// Namespace-wide parse failure counter
pub const PARSE_ERRORS_TOTAL_NAME: &str = "parse_errors_total";
pub const PARSE_ERRORS_TOTAL_HELP: &str = "Total number of log file lines that could not be parsed";

/// Separator used when a composite instrument key is rendered as a single string
pub const KEY_SEPARATOR: &str = "|||";

pub const COUNTER_TAIL: &str = "count";
pub const GAUGE_TAIL: &str = "gauge";
pub const HISTOGRAM_TAIL: &str = "hist";
pub const SUMMARY_TAIL: &str = "summary";

pub const COUNTER_SUFFIX: &str = "_total";
pub const GAUGE_SUFFIX: &str = "_gauge";
pub const HISTOGRAM_SUFFIX: &str = "_hist";
pub const SUMMARY_SUFFIX: &str = "_summary";

/// Quantile → allowed error, used when a summary field sets no objectives
pub const DEFAULT_OBJECTIVES: [(f64, f64); 3] = [(0.5, 0.05), (0.9, 0.01), (0.99, 0.001)];

/// Summary sliding window when `max_age` is unset
pub const DEFAULT_SUMMARY_MAX_AGE_SECS: u64 = 600;

/// Number of rotating buckets the summary window is split into
pub const DEFAULT_SUMMARY_AGE_BUCKETS: usize = 5;

/// Marks a file source entry as a glob pattern. `?` and `[` stay literal so
/// bracketed file names survive recompilation.
pub const GLOB_WILDCARD: char = '*';

/// Default console filter directive when RUST_LOG is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "nginxlog_metrics=info";
