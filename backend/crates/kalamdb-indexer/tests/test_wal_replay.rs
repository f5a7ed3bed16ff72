//! Write-ahead log replay across schema versions

use serde_json::json;

use kalamdb_indexer::{replay_all, IndexerError, IndexerOptions, InMemoryWal, RowIndexer, WriteAheadLog};
use kalamdb_schema::{
    ColumnDescriptor, ColumnPath, ColumnPolicy, DataType, DropColumn, LocalMetadataCoordinator,
    MetadataCoordinator, SchemaLimits, TableId, TableSchema,
};

fn table_id() -> TableId {
    TableId::new("app", "metrics")
}

fn coordinator() -> LocalMetadataCoordinator {
    kalamdb_configs::logging::init_test_logging();
    let coordinator = LocalMetadataCoordinator::new(SchemaLimits::default());
    coordinator
        .create_table(
            TableSchema::builder(table_id())
                .column(ColumnDescriptor::new(ColumnPath::root("host"), DataType::Text))
                .column(ColumnDescriptor::new(ColumnPath::root("cpu"), DataType::Double))
                .primary_key(ColumnPath::root("host"))
                .column_policy(ColumnPolicy::Dynamic),
        )
        .unwrap();
    coordinator
}

fn targets(names: &[&str]) -> Vec<ColumnPath> {
    names.iter().map(|n| ColumnPath::root(*n)).collect()
}

#[test]
fn test_replay_decodes_each_entry_with_its_own_version() {
    let coordinator = coordinator();
    let wal = InMemoryWal::new();
    let options = IndexerOptions::default();
    let mut expected = Vec::new();

    // v1
    let schema = coordinator.schema(&table_id()).unwrap();
    let mut indexer = RowIndexer::new(schema, targets(&["host", "cpu", "region"]), options.clone()).unwrap();
    let doc = indexer.index(&[json!("a"), json!(0.5), serde_json::Value::Null]).unwrap();
    assert_eq!(wal.append(&table_id(), &doc).unwrap(), 1);
    expected.push(doc.fields);

    // v2: region discovered and committed
    let row = [json!("b"), json!(0.7), json!("eu")];
    let staged = indexer.discover_columns(&row).unwrap();
    let schema = coordinator.commit_add_columns(&table_id(), staged, &[], vec![]).unwrap();
    indexer.rebind(schema).unwrap();
    let doc = indexer.index(&row).unwrap();
    assert_eq!(doc.schema_version, 2);
    wal.append(&table_id(), &doc).unwrap();
    expected.push(doc.fields);

    // v3: cpu dropped, later entries no longer carry it
    let schema = coordinator
        .commit_drop_columns(&table_id(), &[DropColumn::new(ColumnPath::root("cpu"))])
        .unwrap();
    let indexer = RowIndexer::new(schema, targets(&["host", "region"]), options.clone()).unwrap();
    let doc = indexer.index(&[json!("c"), json!("us")]).unwrap();
    assert_eq!(doc.schema_version, 3);
    wal.append(&table_id(), &doc).unwrap();
    expected.push(doc.fields);

    assert_eq!(wal.len(), 3);
    let replayed = replay_all(&wal, &coordinator, &table_id(), &options).unwrap();
    let fields: Vec<_> = replayed.into_iter().map(|d| d.fields).collect();
    assert_eq!(fields, expected);
}

#[test]
fn test_latest_schema_skips_dropped_columns_of_old_documents() {
    let coordinator = coordinator();
    let wal = InMemoryWal::new();
    let options = IndexerOptions::default();

    let schema = coordinator.schema(&table_id()).unwrap();
    let indexer = RowIndexer::new(schema, targets(&["host", "cpu"]), options.clone()).unwrap();
    let doc = indexer.index(&[json!("a"), json!(0.5)]).unwrap();
    wal.append(&table_id(), &doc).unwrap();

    let latest = coordinator
        .commit_drop_columns(&table_id(), &[DropColumn::new(ColumnPath::root("cpu"))])
        .unwrap();
    let replay = kalamdb_indexer::ReplayIndexer::new(latest, &options).unwrap();
    let entry = &wal.entries(&table_id())[0];
    let replayed = replay.decode(&entry.source).unwrap();
    assert_eq!(replayed.fields.len(), 1);
    assert_eq!(
        replay.column_values(&replayed.storage),
        vec![(ColumnPath::root("host"), json!("a"))]
    );
}

#[test]
fn test_append_refuses_pending_columns() {
    let coordinator = coordinator();
    let wal = InMemoryWal::new();
    let schema = coordinator.schema(&table_id()).unwrap();
    let indexer = RowIndexer::new(schema, targets(&["host", "extra"]), IndexerOptions::default()).unwrap();

    let doc = indexer.index(&[json!("a"), json!(1)]).unwrap();
    assert!(!doc.is_durable());
    let err = wal.append(&table_id(), &doc).unwrap_err();
    assert!(matches!(err, IndexerError::IndexerMisuse(_)));
    assert!(wal.is_empty());
}

#[test]
fn test_replay_of_table_without_entries_is_empty() {
    let coordinator = coordinator();
    let wal = InMemoryWal::new();
    let other = TableId::new("app", "other");
    assert!(replay_all(&wal, &coordinator, &other, &IndexerOptions::default())
        .unwrap()
        .is_empty());
}
