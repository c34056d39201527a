//! Core traits for the migration pipeline.
//!
//! - [`SourceReader`]: enumerates tables and streams row chunks from one
//!   source database file
//! - [`TargetStore`]: inspects and writes the destination server
//!
//! Both seams have in-memory implementations in the test suite, which is
//! how the transfer engine is exercised without a real driver.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::catalog::CatalogEntry;
use crate::error::Result;
use crate::typemap::TargetColumn;
use crate::value::{RowChunk, SqlValue};

/// State of a destination table, refreshed immediately before each transfer
/// decision.
#[derive(Debug, Clone, Default)]
pub struct TargetTableState {
    /// Whether the table exists.
    pub exists: bool,

    /// Column names, in ordinal order (empty if the table is absent).
    pub columns: Vec<String>,

    /// Current row count (0 if the table is absent).
    pub row_count: u64,
}

/// Read catalog metadata and data from one source database file.
///
/// A reader owns exactly one source file. Locking and retry behavior is
/// internal to implementations; callers only see the final error after the
/// retry budget is spent.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Sanitized identifier of the source database (target database name).
    fn database_id(&self) -> &str;

    /// Enumerate user tables with estimated row counts and column
    /// descriptors. Row counts come from a fast COUNT query, not a scan.
    async fn list_tables(&self) -> Result<Vec<CatalogEntry>>;

    /// Stream rows from a table in the source's natural row order.
    ///
    /// Returns a bounded channel receiver; the reader task owns the open
    /// cursor, so consuming the receiver to completion observes every row
    /// exactly once. `start_offset` skips rows already present on the
    /// target (the resume cursor); each chunk carries at most `chunk_size`
    /// rows and the last one has `is_last` set.
    fn read_table(
        &self,
        table: &str,
        start_offset: u64,
        chunk_size: usize,
    ) -> mpsc::Receiver<Result<RowChunk>>;
}

/// Inspect and write the destination server.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Create the destination database if it does not exist.
    async fn ensure_database(&self, database: &str) -> Result<()>;

    /// Report existence, column set and row count for a table. Read-only.
    async fn table_state(&self, database: &str, table: &str) -> Result<TargetTableState>;

    /// Create a table from mapped column definitions.
    async fn create_table(
        &self,
        database: &str,
        table: &str,
        columns: &[TargetColumn],
    ) -> Result<()>;

    /// Bulk-insert rows. Returns the number of rows written.
    async fn insert_chunk(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;

    /// Insert rows, replacing on key conflict. Returns the number of rows
    /// written.
    async fn upsert_chunk(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        key_columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;
}
