//! Indexer options derived from `IndexerConfig`

use kalamdb_configs::IndexerConfig;
use kalamdb_schema::SchemaLimits;

/// Whether rows are being written or only read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Unknown keys under STRICT objects fail the row; DYNAMIC keys are staged
    Write,
    /// Unknown keys are silently absent unless `fail_on_unknown_for_read` is set
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerOptions {
    pub access_mode: AccessMode,
    /// Array columns introduced at or after this schema version emit a length field
    pub array_length_min_version: u64,
    pub fail_on_unknown_for_read: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::Write,
            array_length_min_version: 1,
            fail_on_unknown_for_read: false,
        }
    }
}

impl IndexerOptions {
    pub fn from_config(config: &IndexerConfig, access_mode: AccessMode) -> Self {
        Self {
            access_mode,
            array_length_min_version: config.indexing.array_length_min_version,
            fail_on_unknown_for_read: config.indexing.fail_on_unknown_for_read,
        }
    }

    pub fn for_read(mut self) -> Self {
        self.access_mode = AccessMode::Read;
        self
    }

    pub(crate) fn rejects_unknown(&self) -> bool {
        match self.access_mode {
            AccessMode::Write => true,
            AccessMode::Read => self.fail_on_unknown_for_read,
        }
    }
}

/// Structural limits enforced by schema mutations
pub fn schema_limits(config: &IndexerConfig) -> SchemaLimits {
    SchemaLimits {
        max_columns: config.schema.max_columns,
        max_depth: config.schema.max_depth,
    }
}
