//! CSV source connector.
//!
//! Treats a `.csv` file as a single-table database whose table name is the
//! sanitized file stem. Column types are inferred from a bounded sample of
//! rows, the way desktop exports usually have to be handled: integer width
//! by magnitude, floats, date-times, VARCHAR sized to the observed width
//! with a TEXT fallback.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::debug;

use crate::catalog::{CatalogEntry, ColumnDescriptor, NativeType};
use crate::error::{MigrateError, Result};
use crate::ident;
use crate::traits::SourceReader;
use crate::value::{RowChunk, SqlValue};

/// Rows sampled for type inference.
const SAMPLE_ROWS: usize = 1_000;

/// Capacity of the chunk channel; bounds memory to a handful of chunks.
const CHANNEL_DEPTH: usize = 4;

/// CSV-backed source reader for one file.
pub struct CsvReader {
    path: PathBuf,
    database: String,
    table: CatalogEntry,
}

impl CsvReader {
    /// Open a CSV file: sample it for column types and count its rows.
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let database = super::database_id_for(&path);
        let table_name = database.clone();

        let entry = {
            let path = path.clone();
            let database = database.clone();
            tokio::task::spawn_blocking(move || analyze(&path, &database, &table_name))
                .await
                .map_err(|e| MigrateError::source(format!("analyze task failed: {}", e)))??
        };

        debug!(
            "CSV source {}: {} columns, ~{} rows",
            path.display(),
            entry.columns.len(),
            entry.estimated_rows
        );

        Ok(Self {
            path,
            database,
            table: entry,
        })
    }
}

/// Infer the catalog entry for a CSV file from its header and a row sample.
fn analyze(path: &Path, database: &str, table: &str) -> Result<CatalogEntry> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(ident::sanitize)
        .collect();
    if headers.is_empty() {
        return Err(MigrateError::source(format!(
            "{}: no header row",
            path.display()
        )));
    }

    let mut states: Vec<ColumnSample> = headers.iter().map(|_| ColumnSample::default()).collect();
    let mut row_count: u64 = 0;

    for record in reader.records() {
        let record = record?;
        row_count += 1;
        if row_count as usize <= SAMPLE_ROWS {
            for (idx, field) in record.iter().enumerate() {
                if let Some(state) = states.get_mut(idx) {
                    state.observe(field);
                }
            }
        }
    }

    let columns = headers
        .into_iter()
        .zip(states)
        .map(|(name, state)| {
            let (native_type, declared_size) = state.into_descriptor();
            ColumnDescriptor {
                name,
                native_type,
                declared_size,
                is_nullable: true,
                is_primary_key: false,
            }
        })
        .collect();

    Ok(CatalogEntry {
        database: database.to_string(),
        name: table.to_string(),
        estimated_rows: row_count,
        columns,
    })
}

/// Running type sample for one column.
#[derive(Debug, Default)]
struct ColumnSample {
    seen: u64,
    all_int: bool,
    all_float: bool,
    all_datetime: bool,
    max_abs_int: i64,
    max_len: usize,
    initialized: bool,
}

impl ColumnSample {
    fn observe(&mut self, field: &str) {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return;
        }

        if !self.initialized {
            self.initialized = true;
            self.all_int = true;
            self.all_float = true;
            self.all_datetime = true;
        }

        self.seen += 1;
        self.max_len = self.max_len.max(trimmed.len());

        if self.all_int {
            match trimmed.parse::<i64>() {
                Ok(v) => self.max_abs_int = self.max_abs_int.max(v.unsigned_abs() as i64),
                Err(_) => self.all_int = false,
            }
        }
        if self.all_float && trimmed.parse::<f64>().is_err() {
            self.all_float = false;
        }
        if self.all_datetime
            && SqlValue::from_text(Some(trimmed.to_string()), &NativeType::DateTime)
                == SqlValue::Text(trimmed.to_string())
        {
            self.all_datetime = false;
        }
    }

    /// Collapse the sample into a native type + declared size.
    fn into_descriptor(self) -> (NativeType, u32) {
        if self.seen == 0 {
            return (NativeType::Text, 255);
        }
        if self.all_int {
            let native = if self.max_abs_int < 128 {
                NativeType::Byte
            } else if self.max_abs_int < 32_768 {
                NativeType::Short
            } else {
                NativeType::Long
            };
            return (native, 0);
        }
        if self.all_float {
            return (NativeType::Double, 0);
        }
        if self.all_datetime {
            return (NativeType::DateTime, 0);
        }
        if self.max_len <= 205 {
            // Sized to the observed width plus headroom, like desktop
            // exports are conventionally imported.
            (NativeType::Text, (self.max_len + 50) as u32)
        } else {
            (NativeType::Memo, 0)
        }
    }
}

#[async_trait::async_trait]
impl SourceReader for CsvReader {
    fn database_id(&self) -> &str {
        &self.database
    }

    async fn list_tables(&self) -> Result<Vec<CatalogEntry>> {
        Ok(vec![self.table.clone()])
    }

    fn read_table(
        &self,
        table: &str,
        start_offset: u64,
        chunk_size: usize,
    ) -> mpsc::Receiver<Result<RowChunk>> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let path = self.path.clone();
        let expected = self.table.name.clone();
        let requested = table.to_string();
        let column_types: Vec<NativeType> = self
            .table
            .columns
            .iter()
            .map(|c| c.native_type.clone())
            .collect();

        tokio::task::spawn_blocking(move || {
            if requested != expected {
                let _ = tx.blocking_send(Err(MigrateError::source(format!(
                    "unknown table '{}' in {}",
                    requested,
                    path.display()
                ))));
                return;
            }

            let mut reader = match csv::Reader::from_path(&path) {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e.into()));
                    return;
                }
            };

            let mut offset = 0u64;
            let mut sent = start_offset;
            let mut rows: Vec<Vec<SqlValue>> = Vec::with_capacity(chunk_size);

            for record in reader.records() {
                let record = match record {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e.into()));
                        return;
                    }
                };

                // Skip up to the resume cursor without materializing values.
                if offset < start_offset {
                    offset += 1;
                    continue;
                }
                offset += 1;

                let row: Vec<SqlValue> = record
                    .iter()
                    .enumerate()
                    .map(|(idx, field)| {
                        let native = column_types.get(idx).unwrap_or(&NativeType::Text);
                        SqlValue::from_text(Some(field.to_string()), native)
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
                        // Receiver dropped (ceiling or cancellation); stop reading.
                        return;
                    }
                    rows = Vec::with_capacity(chunk_size);
                }
            }

            let _ = tx.blocking_send(Ok(RowChunk {
                rows,
                offset: sent,
                is_last: true,
            }));
        });

        rx
    }
}
