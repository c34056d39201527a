//! ODBC-backed source reader for MS Access files.
//!
//! Talks to the Jet/ACE engine through the Microsoft Access ODBC driver.
//! Requires an ODBC driver manager at build time (unixODBC on non-Windows
//! platforms), which is why the module sits behind the `odbc` feature.
//!
//! The Jet engine does not tolerate multiple open handles to the same file
//! from one process, so this reader opens one connection per operation and
//! never runs two operations concurrently — the transfer engine's single
//! active path guarantees the latter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogEntry, ColumnDescriptor, NativeType};
use crate::error::{MigrateError, Result};
use crate::ident;
use crate::retry::{run_with_retry, RetryPolicy, TokioSleeper};
use crate::traits::SourceReader;
use crate::value::{RowChunk, SqlValue};

/// Access ODBC driver names, in order of preference. Old MDB-only drivers
/// still ship on hosts that never saw an Office upgrade.
const DRIVER_CANDIDATES: &[&str] = &[
    "Microsoft Access Driver (*.mdb, *.accdb)",
    "Microsoft Access Driver (*.mdb)",
    "MDBTools",
];

/// Rows fetched per ODBC round trip.
const FETCH_BATCH: usize = 1_000;

/// Max bytes buffered per text cell.
const MAX_CELL_BYTES: usize = 65_536;

/// Capacity of the chunk channel.
const CHANNEL_DEPTH: usize = 4;

/// Column names probed as a fallback primary key when the driver exposes
/// no key metadata for old MDB files.
const COMMON_KEY_NAMES: &[&str] = &["id", "recordid"];

/// ODBC-backed reader for one Access database file.
pub struct AccessReader {
    env: Arc<Environment>,
    connection_string: String,
    path: PathBuf,
    database: String,
    /// Catalog entries paired with the un-sanitized source table name used
    /// in SELECT statements.
    tables: Vec<(CatalogEntry, String)>,
}

impl AccessReader {
    /// Open an Access file, retrying transient locks per `policy`.
    pub async fn open(path: &Path, policy: RetryPolicy) -> Result<Self> {
        let env = Arc::new(Environment::new().map_err(|e| {
            MigrateError::source(format!(
                "failed to create ODBC environment: {} (is unixODBC installed?)",
                e
            ))
        })?);

        let connection_string = build_connection_string(&env, path)?;
        let database = super::database_id_for(path);

        let sleeper = TokioSleeper;
        let what = format!("open {}", path.display());
        let tables = run_with_retry(&policy, &sleeper, &what, || {
            let env = env.clone();
            let connection_string = connection_string.clone();
            let path = path.to_path_buf();
            let database = database.clone();
            async move {
                // A fresh lock file means another session is inside the
                // database; treat it like a driver-reported lock so the
                // backoff budget applies.
                if super::lock_file_recent(&path) {
                    return Err(MigrateError::SourceLocked {
                        path: path.display().to_string(),
                        attempts: 0,
                    });
                }
                tokio::task::spawn_blocking(move || {
                    load_catalog(&env, &connection_string, &path, &database)
                })
                .await
                .map_err(|e| MigrateError::source(format!("catalog task failed: {}", e)))?
            }
        })
        .await?;

        info!(
            "Opened {} ({} user tables)",
            path.display(),
            tables.len()
        );

        Ok(Self {
            env,
            connection_string,
            path: path.to_path_buf(),
            database,
            tables,
        })
    }
}

/// Pick an installed Access driver and build the DBQ connection string.
fn build_connection_string(env: &Environment, path: &Path) -> Result<String> {
    let installed: Vec<String> = env
        .drivers()
        .map(|drivers| drivers.into_iter().map(|d| d.description).collect())
        .unwrap_or_default();

    let chosen = DRIVER_CANDIDATES
        .iter()
        .find(|candidate| installed.iter().any(|d| d == *candidate))
        .copied()
        .or_else(|| {
            // Fall back to anything that looks like an Access/Jet driver.
            installed
                .iter()
                .find(|d| {
                    let lower = d.to_lowercase();
                    lower.contains("access") || lower.contains("mdb")
                })
                .map(|s| {
                    warn!("Using fallback ODBC driver: {}", s);
                    s.as_str()
                })
        });

    let Some(driver) = chosen else {
        return Err(MigrateError::Config(format!(
            "no Microsoft Access ODBC driver found (installed: {:?})",
            installed
        )));
    };

    debug!("Using ODBC driver: {}", driver);
    Ok(format!(
        "DRIVER={{{}}};DBQ={};ReadOnly=1;",
        driver,
        path.display()
    ))
}

/// Fetch every row of a cursor as text cells.
fn fetch_all_text(mut cursor: impl Cursor) -> std::result::Result<Vec<Vec<Option<String>>>, odbc_api::Error> {
    use odbc_api::ResultSetMetadata;

    let num_cols = cursor.num_result_cols()? as usize;
    let mut buffers = TextRowSet::for_cursor(FETCH_BATCH, &mut cursor, Some(4_096))?;
    let mut row_cursor = cursor.bind_buffer(&mut buffers)?;

    let mut rows = Vec::new();
    while let Some(batch) = row_cursor.fetch()? {
        for row_idx in 0..batch.num_rows() {
            let mut row = Vec::with_capacity(num_cols);
            for col_idx in 0..num_cols {
                row.push(
                    batch
                        .at(col_idx, row_idx)
                        .map(|bytes| String::from_utf8_lossy(bytes).to_string()),
                );
            }
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Enumerate user tables and their column metadata.
fn load_catalog(
    env: &Environment,
    connection_string: &str,
    path: &Path,
    database: &str,
) -> Result<Vec<(CatalogEntry, String)>> {
    let conn = env
        .connect_with_connection_string(connection_string, ConnectionOptions::default())
        .map_err(|e| super::source_error(path, e.to_string()))?;

    // ODBC catalog call; TABLE_NAME is the third column of the result.
    let cursor = conn
        .tables("", "", "", "TABLE")
        .map_err(|e| super::source_error(path, e.to_string()))?;
    let table_rows = fetch_all_text(cursor).map_err(|e| super::source_error(path, e.to_string()))?;

    let mut source_names: Vec<String> = table_rows
        .iter()
        .filter_map(|row| row.get(2).and_then(|v| v.clone()))
        .filter(|name| !name.starts_with("MSys") && !name.starts_with('~'))
        .collect();
    source_names.sort();

    let mut tables = Vec::with_capacity(source_names.len());
    for source_name in source_names {
        let columns = load_columns(&conn, path, &source_name)?;
        if columns.is_empty() {
            warn!("{}: no column metadata, skipping", source_name);
            continue;
        }

        let estimated_rows = count_rows(&conn, path, &source_name)?;
        let entry = CatalogEntry {
            database: database.to_string(),
            name: ident::sanitize(&source_name),
            estimated_rows,
            columns,
        };
        debug!(
            "{}: {} columns, ~{} rows",
            entry.name,
            entry.columns.len(),
            estimated_rows
        );
        tables.push((entry, source_name));
    }

    Ok(tables)
}

/// Load column descriptors through the ODBC columns catalog.
fn load_columns(
    conn: &odbc_api::Connection<'_>,
    path: &Path,
    source_table: &str,
) -> Result<Vec<ColumnDescriptor>> {
    let cursor = conn
        .columns("", "", source_table, "")
        .map_err(|e| super::source_error(path, e.to_string()))?;
    let rows = fetch_all_text(cursor).map_err(|e| super::source_error(path, e.to_string()))?;

    // ODBC columns layout: COLUMN_NAME at 3, TYPE_NAME at 5, COLUMN_SIZE at
    // 6, NULLABLE at 10, ORDINAL_POSITION at 16.
    let mut described: Vec<(i64, ColumnDescriptor, String)> = rows
        .into_iter()
        .filter_map(|row| {
            let source_name = row.get(3).and_then(|v| v.clone())?;
            let type_name = row.get(5).and_then(|v| v.clone()).unwrap_or_default();
            let size = row
                .get(6)
                .and_then(|v| v.as_ref())
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(0);
            let nullable = row
                .get(10)
                .and_then(|v| v.as_ref())
                .map(|s| s != "0")
                .unwrap_or(true);
            let ordinal = row
                .get(16)
                .and_then(|v| v.as_ref())
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(i64::MAX);

            let descriptor = ColumnDescriptor {
                name: ident::sanitize(&source_name),
                native_type: NativeType::parse(&type_name),
                declared_size: size,
                is_nullable: nullable,
                is_primary_key: false,
            };
            Some((ordinal, descriptor, source_name))
        })
        .collect();
    described.sort_by_key(|(ordinal, _, _)| *ordinal);

    let mut columns: Vec<ColumnDescriptor> =
        described.into_iter().map(|(_, d, _)| d).collect();
    mark_primary_key(source_table, &mut columns);
    Ok(columns)
}

/// Mark the primary key column.
///
/// The Jet driver exposes no key metadata for old MDB files, so this uses
/// the COUNTER column when there is exactly one, then falls back to the
/// conventional names (`ID`, `<table>ID`, `RecordID`).
fn mark_primary_key(source_table: &str, columns: &mut [ColumnDescriptor]) {
    let counters: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.native_type == NativeType::Counter)
        .map(|(i, _)| i)
        .collect();
    if let [only] = counters.as_slice() {
        columns[*only].is_primary_key = true;
        return;
    }

    let table_key = format!("{}id", ident::sanitize(source_table));
    for candidate in COMMON_KEY_NAMES.iter().copied().chain([table_key.as_str()]) {
        if let Some(col) = columns.iter_mut().find(|c| c.name == candidate) {
            col.is_primary_key = true;
            return;
        }
    }
}

/// Fast COUNT(*) estimate for one table.
fn count_rows(conn: &odbc_api::Connection<'_>, path: &Path, source_table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_jet(source_table));
    let cursor = conn
        .execute(&sql, ())
        .map_err(|e| super::source_error(path, e.to_string()))?
        .ok_or_else(|| MigrateError::source(format!("{}: COUNT returned no cursor", source_table)))?;

    let rows = fetch_all_text(cursor).map_err(|e| super::source_error(path, e.to_string()))?;
    Ok(rows
        .first()
        .and_then(|r| r.first())
        .and_then(|v| v.as_ref())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0))
}

/// Quote a Jet identifier with brackets, escaping closing brackets.
fn quote_jet(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[async_trait::async_trait]
impl SourceReader for AccessReader {
    fn database_id(&self) -> &str {
        &self.database
    }

    async fn list_tables(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.tables.iter().map(|(entry, _)| entry.clone()).collect())
    }

    fn read_table(
        &self,
        table: &str,
        start_offset: u64,
        chunk_size: usize,
    ) -> mpsc::Receiver<Result<RowChunk>> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

        let Some((entry, source_name)) = self
            .tables
            .iter()
            .find(|(entry, _)| entry.name == table)
            .cloned()
        else {
            let table = table.to_string();
            let path = self.path.display().to_string();
            tokio::spawn(async move {
                let _ = tx
                    .send(Err(MigrateError::source(format!(
                        "unknown table '{}' in {}",
                        table, path
                    ))))
                    .await;
            });
            return rx;
        };

        let env = self.env.clone();
        let connection_string = self.connection_string.clone();
        let path = self.path.clone();
        let column_types: Vec<NativeType> =
            entry.columns.iter().map(|c| c.native_type.clone()).collect();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = stream_rows(
                &env,
                &connection_string,
                &path,
                &source_name,
                &column_types,
                start_offset,
                chunk_size,
                &tx,
            ) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }
}

/// Scan one table and push chunks until the receiver hangs up.
#[allow(clippy::too_many_arguments)]
fn stream_rows(
    env: &Environment,
    connection_string: &str,
    path: &Path,
    source_table: &str,
    column_types: &[NativeType],
    start_offset: u64,
    chunk_size: usize,
    tx: &mpsc::Sender<Result<RowChunk>>,
) -> Result<()> {
    let conn = env
        .connect_with_connection_string(connection_string, ConnectionOptions::default())
        .map_err(|e| super::source_error(path, e.to_string()))?;

    // Jet has no OFFSET; the open cursor is the ordering guarantee, and
    // resume skips rows by advancing through them.
    let sql = format!("SELECT * FROM {}", quote_jet(source_table));
    let mut cursor = conn
        .execute(&sql, ())
        .map_err(|e| super::source_error(path, e.to_string()))?
        .ok_or_else(|| MigrateError::source(format!("{}: SELECT returned no cursor", source_table)))?;

    let mut buffers = TextRowSet::for_cursor(FETCH_BATCH, &mut cursor, Some(MAX_CELL_BYTES))
        .map_err(|e| super::source_error(path, e.to_string()))?;
    let mut row_cursor = cursor
        .bind_buffer(&mut buffers)
        .map_err(|e| super::source_error(path, e.to_string()))?;

    let mut offset = 0u64;
    let mut sent = start_offset;
    let mut rows: Vec<Vec<SqlValue>> = Vec::with_capacity(chunk_size);

    while let Some(batch) = row_cursor
        .fetch()
        .map_err(|e| super::source_error(path, e.to_string()))?
    {
        for row_idx in 0..batch.num_rows() {
            if offset < start_offset {
                offset += 1;
                continue;
            }
            offset += 1;

            let row: Vec<SqlValue> = (0..column_types.len())
                .map(|col_idx| {
                    let raw = batch
                        .at(col_idx, row_idx)
                        .map(|bytes| String::from_utf8_lossy(bytes).to_string());
                    SqlValue::from_text(raw, &column_types[col_idx])
                })
                .collect();
            rows.push(row);

            if rows.len() >= chunk_size {
                let chunk = RowChunk {
                    rows: std::mem::take(&mut rows),
                    offset: sent,
                    is_last: false,
                };
                sent = offset;
                if tx.blocking_send(Ok(chunk)).is_err() {
                    // Receiver dropped (ceiling or cancellation).
                    return Ok(());
                }
                rows = Vec::with_capacity(chunk_size);
            }
        }
    }

    let _ = tx.blocking_send(Ok(RowChunk {
        rows,
        offset: sent,
        is_last: true,
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_jet() {
        assert_eq!(quote_jet("Orders"), "[Orders]");
        assert_eq!(quote_jet("Odd]Name"), "[Odd]]Name]");
    }

    #[test]
    fn test_mark_primary_key_prefers_counter() {
        let mut cols = vec![
            ColumnDescriptor {
                name: "code".into(),
                native_type: NativeType::Text,
                declared_size: 10,
                is_nullable: false,
                is_primary_key: false,
            },
            ColumnDescriptor {
                name: "seq".into(),
                native_type: NativeType::Counter,
                declared_size: 0,
                is_nullable: false,
                is_primary_key: false,
            },
        ];
        mark_primary_key("Orders", &mut cols);
        assert!(cols[1].is_primary_key);
        assert!(!cols[0].is_primary_key);
    }

    #[test]
    fn test_mark_primary_key_common_name_fallback() {
        let mut cols = vec![ColumnDescriptor {
            name: "ordersid".into(),
            native_type: NativeType::Long,
            declared_size: 0,
            is_nullable: false,
            is_primary_key: false,
        }];
        mark_primary_key("Orders", &mut cols);
        assert!(cols[0].is_primary_key);
    }
}
