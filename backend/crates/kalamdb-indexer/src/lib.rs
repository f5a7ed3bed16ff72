//! # kalamdb-indexer
//!
//! Turns semi-structured rows into the canonical storage form and the typed
//! search fields of a KalamDB document table.
//!
//! ```text
//! row values (aligned to target columns)
//!       ↓
//! RowIndexer::discover_columns ──> proposal ──> MetadataCoordinator ──> rebind
//!       ↓
//! RowIndexer::index
//!   generated → defaults → not-null → check constraints
//!       ↓
//! StorageDocument (column-id keyed) ──> WriteAheadLog
//!       ↓
//! SearchField list (StorageSupport value indexers)
//!       ↑
//! ReplayIndexer::decode (same value indexers, any historical schema version)
//! ```

pub mod discovery;
pub mod encoder;
pub mod error;
pub mod replay;
pub mod row;
pub mod row_indexer;
pub mod search_field;
pub mod settings;
pub mod storage_form;
pub mod storage_support;
pub mod wal;

pub use error::{IndexerError, Result, RowRejection};
pub use replay::{ReplayIndexer, ReplayedDocument};
pub use row_indexer::{EncodedDocument, RowIndexer};
pub use search_field::{FieldValue, SearchField};
pub use settings::{schema_limits, AccessMode, IndexerOptions};
pub use storage_form::{StorageDocument, StoredValue};
pub use storage_support::{SearchFieldEmitter, StorageSupport, TypePosition, ValueIndexer};
pub use wal::{replay_all, InMemoryWal, WalEntry, WriteAheadLog};
