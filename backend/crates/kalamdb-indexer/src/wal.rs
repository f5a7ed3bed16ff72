//! Write-ahead log of stored documents
//!
//! Entries carry the schema version they were encoded with; replay decodes
//! each one against that exact version.

use parking_lot::Mutex;

use kalamdb_schema::{MetadataCoordinator, TableId};

use crate::error::{IndexerError, Result};
use crate::replay::{ReplayIndexer, ReplayedDocument};
use crate::row_indexer::EncodedDocument;
use crate::settings::IndexerOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub sequence: u64,
    pub table_id: TableId,
    pub schema_version: u64,
    pub source: Vec<u8>,
}

pub trait WriteAheadLog: Send + Sync {
    /// Append a document and return its sequence number.
    ///
    /// Documents still holding uncommitted columns are refused: their values
    /// would not survive replay.
    fn append(&self, table_id: &TableId, document: &EncodedDocument) -> Result<u64>;

    /// Entries of `table_id` in sequence order
    fn entries(&self, table_id: &TableId) -> Vec<WalEntry>;
}

#[derive(Debug, Default)]
pub struct InMemoryWal {
    entries: Mutex<Vec<WalEntry>>,
}

impl InMemoryWal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl WriteAheadLog for InMemoryWal {
    fn append(&self, table_id: &TableId, document: &EncodedDocument) -> Result<u64> {
        if !document.is_durable() {
            let pending: Vec<String> = document.pending_columns.iter().map(|p| p.to_string()).collect();
            return Err(IndexerError::IndexerMisuse(format!(
                "Document for {} holds uncommitted columns [{}]; commit and re-index before appending",
                table_id,
                pending.join(", ")
            )));
        }
        let mut entries = self.entries.lock();
        let sequence = entries.len() as u64 + 1;
        entries.push(WalEntry {
            sequence,
            table_id: table_id.clone(),
            schema_version: document.schema_version,
            source: document.source.clone(),
        });
        log::trace!("WAL append {} for {} (schema version {})", sequence, table_id, document.schema_version);
        Ok(sequence)
    }

    fn entries(&self, table_id: &TableId) -> Vec<WalEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| &e.table_id == table_id)
            .cloned()
            .collect()
    }
}

/// Decode every entry of `table_id`, each against the schema version it was
/// written with
pub fn replay_all(
    wal: &dyn WriteAheadLog,
    coordinator: &dyn MetadataCoordinator,
    table_id: &TableId,
    options: &IndexerOptions,
) -> Result<Vec<ReplayedDocument>> {
    let mut indexer: Option<ReplayIndexer> = None;
    let mut documents = Vec::new();

    for entry in wal.entries(table_id) {
        let current_version = indexer.as_ref().map(|i| i.schema().version());
        if current_version != Some(entry.schema_version) {
            let schema = coordinator.schema_at(table_id, entry.schema_version)?;
            indexer = Some(ReplayIndexer::new(schema, options)?);
        }
        let Some(replay) = indexer.as_ref() else {
            continue;
        };
        documents.push(replay.decode(&entry.source)?);
    }

    log::debug!("Replayed {} WAL entries for {}", documents.len(), table_id);
    Ok(documents)
}
