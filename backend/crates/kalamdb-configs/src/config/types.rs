use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for the schema layer and the row indexing pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default)]
    pub schema: SchemaSettings,
    #[serde(default)]
    pub indexing: IndexingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Global limits enforced by every schema mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSettings {
    /// Ceiling on the number of non-system columns of a table
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
    /// Ceiling on the number of path segments of a nested column
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            max_columns: default_max_columns(),
            max_depth: default_max_depth(),
        }
    }
}

/// Row indexing behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingSettings {
    /// Array columns introduced at or after this schema version emit an
    /// array-length field for their outermost array
    #[serde(default = "default_array_length_min_version")]
    pub array_length_min_version: u64,
    /// When reading, fail on keys that a STRICT object does not know instead of
    /// silently ignoring them
    #[serde(default = "default_false")]
    pub fail_on_unknown_for_read: bool,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            array_length_min_version: default_array_length_min_version(),
            fail_on_unknown_for_read: default_false(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    /// Optional per-target log level overrides
    /// Configure via a TOML table:
    /// [logging.targets]
    /// kalamdb_indexer = "debug"
    /// kalamdb_schema = "trace"
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_to_console: default_true(),
            targets: HashMap::new(),
        }
    }
}
