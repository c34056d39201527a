//! End-to-end transfer engine tests over in-memory source and target
//! implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use access_mysql_migrate::catalog::{CatalogEntry, ColumnDescriptor, NativeType};
use access_mysql_migrate::error::{MigrateError, Result};
use access_mysql_migrate::progress::ProgressTracker;
use access_mysql_migrate::report::{TableStatus, TransferDecision};
use access_mysql_migrate::traits::{SourceReader, TargetStore, TargetTableState};
use access_mysql_migrate::transfer::{TransferConfig, TransferEngine};
use access_mysql_migrate::typemap::TargetColumn;
use access_mysql_migrate::value::{RowChunk, SqlValue};

/// In-memory source database.
struct MemorySource {
    database: String,
    tables: Vec<CatalogEntry>,
    rows: HashMap<String, Vec<Vec<SqlValue>>>,
}

impl MemorySource {
    fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            tables: Vec::new(),
            rows: HashMap::new(),
        }
    }

    /// Add a table of (id, label) rows.
    fn with_table(mut self, name: &str, row_count: u64) -> Self {
        let rows: Vec<Vec<SqlValue>> = (0..row_count)
            .map(|i| {
                vec![
                    SqlValue::Int(i as i64),
                    SqlValue::Text(format!("row-{}", i)),
                ]
            })
            .collect();

        self.tables.push(CatalogEntry {
            database: self.database.clone(),
            name: name.to_string(),
            estimated_rows: row_count,
            columns: vec![
                ColumnDescriptor {
                    name: "id".into(),
                    native_type: NativeType::Long,
                    declared_size: 0,
                    is_nullable: false,
                    is_primary_key: true,
                },
                ColumnDescriptor {
                    name: "label".into(),
                    native_type: NativeType::Text,
                    declared_size: 50,
                    is_nullable: true,
                    is_primary_key: false,
                },
            ],
        });
        self.rows.insert(name.to_string(), rows);
        self
    }

    /// Drop the key flag from every column of a table.
    fn without_keys(mut self, name: &str) -> Self {
        for table in &mut self.tables {
            if table.name == name {
                for col in &mut table.columns {
                    col.is_primary_key = false;
                }
            }
        }
        self
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    fn database_id(&self) -> &str {
        &self.database
    }

    async fn list_tables(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.tables.clone())
    }

    fn read_table(
        &self,
        table: &str,
        start_offset: u64,
        chunk_size: usize,
    ) -> mpsc::Receiver<Result<RowChunk>> {
        let (tx, rx) = mpsc::channel(4);
        let rows = self.rows.get(table).cloned().unwrap_or_default();

        tokio::spawn(async move {
            let mut sent = start_offset;
            let mut pending: Vec<Vec<SqlValue>> = Vec::with_capacity(chunk_size);

            for row in rows.into_iter().skip(start_offset as usize) {
                pending.push(row);
                if pending.len() >= chunk_size {
                    let count = pending.len() as u64;
                    let chunk = RowChunk {
                        rows: std::mem::take(&mut pending),
                        offset: sent,
                        is_last: false,
                    };
                    sent += count;
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                }
            }

            let _ = tx
                .send(Ok(RowChunk {
                    rows: pending,
                    offset: sent,
                    is_last: true,
                }))
                .await;
        });

        rx
    }
}

/// One stored table on the in-memory target.
#[derive(Default, Clone)]
struct StoredTable {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

/// In-memory target server.
#[derive(Default)]
struct MemoryTarget {
    tables: Mutex<HashMap<(String, String), StoredTable>>,
    create_order: Mutex<Vec<String>>,
    /// Number of chunk write operations (insert + upsert).
    write_ops: AtomicU64,
    /// Table that starts refusing writes after `fail_after_ops` operations.
    poison: Option<(String, u64)>,
}

impl MemoryTarget {
    fn new() -> Self {
        Self::default()
    }

    fn poisoned(table: &str, fail_after_ops: u64) -> Self {
        Self {
            poison: Some((table.to_string(), fail_after_ops)),
            ..Self::default()
        }
    }

    fn write_ops(&self) -> u64 {
        self.write_ops.load(Ordering::SeqCst)
    }

    fn rows_of(&self, database: &str, table: &str) -> Vec<Vec<SqlValue>> {
        self.tables
            .lock()
            .unwrap()
            .get(&(database.to_string(), table.to_string()))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn creation_order(&self) -> Vec<String> {
        self.create_order.lock().unwrap().clone()
    }

    /// Refuse writes to the poisoned table once the global op counter
    /// reaches `fail_after`.
    fn check_poison(&self, table: &str, ops: u64) -> Result<()> {
        if let Some((poisoned, fail_after)) = &self.poison {
            if poisoned == table && ops >= *fail_after {
                return Err(MigrateError::transfer(table, "simulated write refusal"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn ensure_database(&self, _database: &str) -> Result<()> {
        Ok(())
    }

    async fn table_state(&self, database: &str, table: &str) -> Result<TargetTableState> {
        let tables = self.tables.lock().unwrap();
        Ok(
            match tables.get(&(database.to_string(), table.to_string())) {
                Some(stored) => TargetTableState {
                    exists: true,
                    columns: stored.columns.clone(),
                    row_count: stored.rows.len() as u64,
                },
                None => TargetTableState::default(),
            },
        )
    }

    async fn create_table(
        &self,
        database: &str,
        table: &str,
        columns: &[TargetColumn],
    ) -> Result<()> {
        self.create_order.lock().unwrap().push(table.to_string());
        self.tables.lock().unwrap().insert(
            (database.to_string(), table.to_string()),
            StoredTable {
                columns: columns.iter().map(|c| c.name.clone()).collect(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn insert_chunk(
        &self,
        database: &str,
        table: &str,
        _columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        let ops = self.write_ops.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_poison(table, ops)?;

        let mut tables = self.tables.lock().unwrap();
        let stored = tables
            .entry((database.to_string(), table.to_string()))
            .or_default();
        let count = rows.len() as u64;
        stored.rows.extend(rows);
        Ok(count)
    }

    async fn upsert_chunk(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        key_columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        let ops = self.write_ops.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_poison(table, ops)?;

        let key_idx = columns
            .iter()
            .position(|c| c == &key_columns[0])
            .expect("key column present");

        let mut tables = self.tables.lock().unwrap();
        let stored = tables
            .entry((database.to_string(), table.to_string()))
            .or_default();

        let count = rows.len() as u64;
        for row in rows {
            let key = row[key_idx].clone();
            if let Some(existing) = stored.rows.iter_mut().find(|r| r[key_idx] == key) {
                *existing = row;
            } else {
                stored.rows.push(row);
            }
        }
        Ok(count)
    }
}

fn engine(
    source: Arc<MemorySource>,
    target: Arc<MemoryTarget>,
    chunk_size: usize,
    row_ceiling: u64,
) -> (TransferEngine, Arc<ProgressTracker>) {
    let progress = Arc::new(ProgressTracker::new());
    let engine = TransferEngine::new(
        source,
        target,
        TransferConfig {
            chunk_size,
            row_ceiling,
        },
        progress.clone(),
        CancellationToken::new(),
    );
    (engine, progress)
}

#[tokio::test]
async fn fresh_migration_creates_smallest_first() {
    let source = Arc::new(
        MemorySource::new("north")
            .with_table("orders", 50_000)
            .with_table("users", 10),
    );
    let target = Arc::new(MemoryTarget::new());
    let (engine, progress) = engine(source, target.clone(), 1_000, 500_000);

    let outcomes = engine.run().await.unwrap();

    // Smallest table first, both created and completed.
    assert_eq!(target.creation_order(), vec!["users", "orders"]);
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].table, "users");
    assert_eq!(outcomes[0].decision, TransferDecision::Create);
    assert_eq!(outcomes[0].status, TableStatus::Completed);
    assert_eq!(outcomes[0].rows_written, 10);
    assert_eq!(outcomes[1].table, "orders");
    assert_eq!(outcomes[1].decision, TransferDecision::Create);
    assert_eq!(outcomes[1].status, TableStatus::Completed);
    assert_eq!(outcomes[1].rows_written, 50_000);

    let snap = progress.snapshot();
    assert_eq!(snap.rows_processed, 50_010);
    assert_eq!(snap.tables_completed, 2);
    assert_eq!(snap.tables_failed, 0);
}

#[tokio::test]
async fn second_run_skips_with_zero_writes() {
    let make_source = || {
        Arc::new(
            MemorySource::new("north")
                .with_table("users", 10)
                .with_table("orders", 500),
        )
    };
    let target = Arc::new(MemoryTarget::new());

    let (first, _) = engine(make_source(), target.clone(), 100, 500_000);
    first.run().await.unwrap();
    let ops_after_first = target.write_ops();

    let (second, progress) = engine(make_source(), target.clone(), 100, 500_000);
    let outcomes = second.run().await.unwrap();

    for outcome in &outcomes {
        assert_eq!(outcome.decision, TransferDecision::Skip);
        assert_eq!(outcome.status, TableStatus::Skipped);
        assert_eq!(outcome.rows_written, 0);
    }
    // Idempotence: not a single extra chunk write on the second run.
    assert_eq!(target.write_ops(), ops_after_first);
    assert_eq!(progress.snapshot().tables_skipped, 2);
    assert_eq!(progress.snapshot().rows_processed, 0);
}

#[tokio::test]
async fn grown_source_updates_only_the_delta() {
    let target = Arc::new(MemoryTarget::new());

    let before = Arc::new(
        MemorySource::new("north")
            .with_table("users", 10)
            .with_table("orders", 50_000),
    );
    let (first, _) = engine(before, target.clone(), 1_000, 500_000);
    first.run().await.unwrap();
    let ops_after_first = target.write_ops();

    let after = Arc::new(
        MemorySource::new("north")
            .with_table("users", 10)
            .with_table("orders", 60_000),
    );
    let (second, progress) = engine(after, target.clone(), 1_000, 500_000);
    let outcomes = second.run().await.unwrap();

    let users = outcomes.iter().find(|o| o.table == "users").unwrap();
    assert_eq!(users.decision, TransferDecision::Skip);

    let orders = outcomes.iter().find(|o| o.table == "orders").unwrap();
    assert_eq!(orders.decision, TransferDecision::Update);
    assert_eq!(orders.status, TableStatus::Updated);
    assert_eq!(orders.rows_written, 10_000);

    // Ten chunks of 1,000 rows moved the delta.
    assert_eq!(target.write_ops() - ops_after_first, 10);
    assert_eq!(target.rows_of("north", "orders").len(), 60_000);
    assert_eq!(progress.snapshot().rows_processed, 10_000);
}

#[tokio::test]
async fn chunked_transfer_preserves_order_and_chunk_count() {
    let source = Arc::new(MemorySource::new("db").with_table("seq", 100));
    let target = Arc::new(MemoryTarget::new());
    let (engine, _) = engine(source, target.clone(), 7, 500_000);

    engine.run().await.unwrap();

    // ceil(100 / 7) chunk operations.
    assert_eq!(target.write_ops(), 15);

    let ids: Vec<i64> = target
        .rows_of("db", "seq")
        .iter()
        .map(|row| match &row[0] {
            SqlValue::Int(v) => *v,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    assert_eq!(ids, (0..100).collect::<Vec<i64>>());
}

#[tokio::test]
async fn ceiling_flags_partial_never_silent() {
    let source = Arc::new(MemorySource::new("db").with_table("big", 1_000));
    let target = Arc::new(MemoryTarget::new());
    let (engine, _) = engine(source, target.clone(), 100, 250);

    let outcomes = engine.run().await.unwrap();
    let big = &outcomes[0];
    assert_eq!(big.status, TableStatus::Partial);
    assert_eq!(big.rows_written, 250);
    assert!(big.warnings.iter().any(|w| w.contains("ceiling")));
    assert_eq!(target.rows_of("db", "big").len(), 250);
}

#[tokio::test]
async fn table_of_exactly_ceiling_rows_completes() {
    let source = Arc::new(MemorySource::new("db").with_table("edge", 250));
    let target = Arc::new(MemoryTarget::new());
    let (engine, _) = engine(source, target.clone(), 100, 250);

    let outcomes = engine.run().await.unwrap();
    assert_eq!(outcomes[0].status, TableStatus::Completed);
    assert_eq!(outcomes[0].rows_written, 250);
}

#[tokio::test]
async fn failed_table_preserves_rows_and_run_continues() {
    let source = Arc::new(
        MemorySource::new("db")
            .with_table("flaky", 300)
            .without_keys("flaky")
            .with_table("zz_steady", 5),
    );
    // Op 1 is zz_steady (it is smaller, so it runs first); flaky's first
    // chunk is op 2 and its second chunk (op 3) refuses.
    let target = Arc::new(MemoryTarget::poisoned("flaky", 3));
    let (engine, progress) = engine(source, target.clone(), 100, 500_000);

    let outcomes = engine.run().await.unwrap();

    let steady = outcomes.iter().find(|o| o.table == "zz_steady").unwrap();
    assert_eq!(steady.status, TableStatus::Completed);

    let flaky = outcomes.iter().find(|o| o.table == "flaky").unwrap();
    assert_eq!(flaky.status, TableStatus::Failed);
    assert!(flaky.error.as_deref().unwrap().contains("simulated"));
    // Partial rows written before the failure are preserved, not rolled back.
    assert_eq!(flaky.rows_written, 100);
    assert_eq!(target.rows_of("db", "flaky").len(), 100);

    let snap = progress.snapshot();
    assert_eq!(snap.tables_failed, 1);
    assert_eq!(snap.tables_completed, 1);
}

#[tokio::test]
async fn shrunken_source_reupserts_everything() {
    let target = Arc::new(MemoryTarget::new());

    let before = Arc::new(MemorySource::new("db").with_table("t", 100));
    let (first, _) = engine(before, target.clone(), 50, 500_000);
    first.run().await.unwrap();

    let after = Arc::new(MemorySource::new("db").with_table("t", 60));
    let (second, _) = engine(after, target.clone(), 50, 500_000);
    let outcomes = second.run().await.unwrap();

    assert_eq!(outcomes[0].decision, TransferDecision::Update);
    assert_eq!(outcomes[0].status, TableStatus::Updated);
    // Full re-upsert: all 60 source rows were written (keyed, so no dupes).
    assert_eq!(outcomes[0].rows_written, 60);
    assert_eq!(target.rows_of("db", "t").len(), 100);
}

#[tokio::test]
async fn update_without_key_appends_with_warning() {
    let target = Arc::new(MemoryTarget::new());

    let before = Arc::new(MemorySource::new("db").with_table("log", 40).without_keys("log"));
    let (first, _) = engine(before, target.clone(), 25, 500_000);
    first.run().await.unwrap();

    let after = Arc::new(MemorySource::new("db").with_table("log", 50).without_keys("log"));
    let (second, _) = engine(after, target.clone(), 25, 500_000);
    let outcomes = second.run().await.unwrap();

    assert_eq!(outcomes[0].decision, TransferDecision::Update);
    assert_eq!(outcomes[0].rows_written, 10);
    assert!(outcomes[0]
        .warnings
        .iter()
        .any(|w| w.contains("no key column")));
    assert_eq!(target.rows_of("db", "log").len(), 50);
}

#[tokio::test]
async fn cancelled_run_starts_no_tables() {
    let source = Arc::new(MemorySource::new("db").with_table("t", 100));
    let target = Arc::new(MemoryTarget::new());
    let progress = Arc::new(ProgressTracker::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let engine = TransferEngine::new(
        source,
        target.clone(),
        TransferConfig {
            chunk_size: 10,
            row_ceiling: 500_000,
        },
        progress,
        cancel,
    );

    let outcomes = engine.run().await.unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(target.write_ops(), 0);
}

#[tokio::test]
async fn cancellation_mid_table_finalizes_failed() {
    let source = Arc::new(MemorySource::new("db").with_table("t", 1_000));
    let target = Arc::new(MemoryTarget::new());
    let progress = Arc::new(ProgressTracker::new());
    let cancel = CancellationToken::new();

    let engine = TransferEngine::new(
        source.clone(),
        target.clone(),
        TransferConfig {
            chunk_size: 100,
            row_ceiling: 500_000,
        },
        progress,
        cancel.clone(),
    );

    // Cancel while the first table is (or is about to start) streaming.
    let entry = source.list_tables().await.unwrap().remove(0);
    target.ensure_database("db").await.unwrap();
    cancel.cancel();
    let outcome = engine.migrate_table(&entry).await;

    assert_eq!(outcome.status, TableStatus::Failed);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .to_lowercase()
        .contains("cancel"));
}
