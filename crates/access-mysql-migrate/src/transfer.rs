//! Transfer engine: schedules tables, decides create/update/skip, and
//! streams bounded chunks from source to target.
//!
//! One engine instance drives one source database. Tables run strictly one
//! at a time (the Jet engine does not tolerate concurrent handles into the
//! same file); the only intra-table concurrency is the producer/consumer
//! pair formed with the source reader task over a bounded channel.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::CatalogEntry;
use crate::error::{MigrateError, Result};
use crate::progress::ProgressTracker;
use crate::report::{TableOutcome, TableStatus, TransferDecision};
use crate::traits::{SourceReader, TargetStore};
use crate::typemap::{map_column, TargetColumn};

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per chunk.
    pub chunk_size: usize,

    /// Maximum rows written for one table in one invocation.
    pub row_ceiling: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            row_ceiling: 500_000,
        }
    }
}

/// Compute the per-table transfer decision.
///
/// Pure function of the freshly inspected target state and the catalog
/// estimate; must be called immediately before the transfer starts since
/// the target state goes stale the moment writing begins.
pub fn decide(exists: bool, rows_source: u64, rows_target: u64) -> TransferDecision {
    if !exists {
        TransferDecision::Create
    } else if rows_source == rows_target {
        TransferDecision::Skip
    } else {
        TransferDecision::Update
    }
}

/// Transfer engine for one source database.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetStore>,
    config: TransferConfig,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

impl TransferEngine {
    /// Create a new transfer engine.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetStore>,
        config: TransferConfig,
        progress: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            target,
            config,
            progress,
            cancel,
        }
    }

    /// Migrate every table of the source database.
    ///
    /// Returns the per-table outcomes in processing order. A table failure
    /// is recorded and the loop continues; only catalog/connection level
    /// errors (or cancellation before any table started) surface as `Err`.
    pub async fn run(&self) -> Result<Vec<TableOutcome>> {
        let database = self.source.database_id().to_string();

        let mut entries = self.source.list_tables().await?;
        // Smallest tables first: failures surface early and a time-boxed
        // run completes as many tables as possible.
        entries.sort_by_key(|e| e.estimated_rows);

        self.target.ensure_database(&database).await?;

        info!(
            "{}: migrating {} tables (chunk size {}, ceiling {})",
            database,
            entries.len(),
            self.config.chunk_size,
            self.config.row_ceiling
        );

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in &entries {
            if self.cancel.is_cancelled() {
                info!("{}: cancellation requested, stopping", database);
                break;
            }

            let outcome = self.migrate_table(entry).await;
            self.progress.count_table(&outcome);
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Migrate one table and produce its terminal outcome.
    pub async fn migrate_table(&self, entry: &CatalogEntry) -> TableOutcome {
        let started = Instant::now();
        let database = &entry.database;
        let table = &entry.name;

        let mut outcome = TableOutcome {
            table: table.clone(),
            decision: TransferDecision::Skip,
            rows_source: entry.estimated_rows,
            rows_written: 0,
            status: TableStatus::Skipped,
            duration_seconds: 0.0,
            error: None,
            warnings: Vec::new(),
        };

        // Inspect immediately before deciding; the state is stale the
        // moment the transfer starts.
        let state = match self.target.table_state(database, table).await {
            Ok(state) => state,
            Err(e) => {
                outcome.status = TableStatus::Failed;
                outcome.error = Some(format!("inspecting target: {}", e));
                outcome.duration_seconds = started.elapsed().as_secs_f64();
                return outcome;
            }
        };

        let decision = decide(state.exists, entry.estimated_rows, state.row_count);
        outcome.decision = decision;

        let start_offset = match decision {
            TransferDecision::Skip => {
                info!(
                    "{}.{}: {} rows already current, skipping",
                    database, table, state.row_count
                );
                outcome.duration_seconds = started.elapsed().as_secs_f64();
                return outcome;
            }
            TransferDecision::Create => {
                let mapped: Vec<TargetColumn> = entry.columns.iter().map(map_column).collect();
                for col in &mapped {
                    if let Some(warning) = &col.warning {
                        outcome.warnings.push(format!("{}: {}", col.name, warning));
                    }
                }
                if let Err(e) = self.target.create_table(database, table, &mapped).await {
                    outcome.status = TableStatus::Failed;
                    outcome.error = Some(format!("creating table: {}", e));
                    outcome.duration_seconds = started.elapsed().as_secs_f64();
                    return outcome;
                }
                0
            }
            TransferDecision::Update => {
                if state.row_count < entry.estimated_rows {
                    // Only the delta needs to move; earlier rows are
                    // already on the target.
                    state.row_count
                } else {
                    warn!(
                        "{}.{}: target holds {} rows but source has {}, re-upserting all",
                        database, table, state.row_count, entry.estimated_rows
                    );
                    0
                }
            }
        };

        let upsert = decision == TransferDecision::Update && !entry.key_columns().is_empty();
        if decision == TransferDecision::Update && !upsert {
            outcome
                .warnings
                .push("no key column; delta appended without conflict handling".to_string());
        }

        match self.copy_rows(entry, start_offset, upsert, &mut outcome).await {
            Ok(ceiling_hit) => {
                outcome.status = if ceiling_hit {
                    outcome.warnings.push(format!(
                        "row ceiling ({}) reached, table transferred partially",
                        self.config.row_ceiling
                    ));
                    TableStatus::Partial
                } else {
                    match decision {
                        TransferDecision::Create => TableStatus::Completed,
                        _ => TableStatus::Updated,
                    }
                };
            }
            Err(e) => {
                // Rows already written stay in place; there is no rollback
                // across chunks.
                outcome.status = TableStatus::Failed;
                outcome.error = Some(e.to_string());
            }
        }

        outcome.duration_seconds = started.elapsed().as_secs_f64();
        let rows_per_sec = if outcome.duration_seconds > 0.0 {
            (outcome.rows_written as f64 / outcome.duration_seconds) as u64
        } else {
            0
        };
        info!(
            "{}.{}: {:?} -> {:?}, {} rows in {:.1}s ({} rows/sec)",
            database,
            table,
            outcome.decision,
            outcome.status,
            outcome.rows_written,
            outcome.duration_seconds,
            rows_per_sec
        );

        outcome
    }

    /// Pull chunks and write them until the table ends, the ceiling trips,
    /// or the run is cancelled. Returns whether the ceiling was hit.
    async fn copy_rows(
        &self,
        entry: &CatalogEntry,
        start_offset: u64,
        upsert: bool,
        outcome: &mut TableOutcome,
    ) -> Result<bool> {
        let database = &entry.database;
        let table = &entry.name;
        let columns = entry.column_names();
        let key_columns = entry.key_columns();

        let mut rx = self
            .source
            .read_table(table, start_offset, self.config.chunk_size);

        let mut bytes_moved: u64 = 0;

        loop {
            // Cancellation is only honored between chunks; an in-flight
            // chunk write always finishes. Biased so a pending cancel wins
            // over a ready chunk.
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(MigrateError::Cancelled);
                }
                chunk = rx.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                // Reader task ended without a final chunk; treat what we
                // have as complete.
                return Ok(false);
            };
            let mut chunk = chunk?;

            // A chunk that fits the remaining budget exactly is written in
            // full and the next chunk settles whether the table actually
            // exceeded the ceiling (a trailing empty final chunk means it
            // ended right on it).
            let remaining = self.config.row_ceiling.saturating_sub(outcome.rows_written);
            let ceiling_hit = (chunk.rows.len() as u64) > remaining;
            if ceiling_hit {
                chunk.rows.truncate(remaining as usize);
            }

            if !chunk.rows.is_empty() {
                bytes_moved += chunk
                    .rows
                    .iter()
                    .flat_map(|row| row.iter().map(|v| v.estimated_size() as u64))
                    .sum::<u64>();

                let written = if upsert {
                    self.target
                        .upsert_chunk(database, table, &columns, &key_columns, chunk.rows)
                        .await?
                } else {
                    self.target
                        .insert_chunk(database, table, &columns, chunk.rows)
                        .await?
                };

                outcome.rows_written += written;
                self.progress.add_rows_processed(written);
            }

            if ceiling_hit {
                // Dropping the receiver stops the reader task.
                drop(rx);
                info!(
                    "{}.{}: ~{} KiB moved before ceiling",
                    database,
                    table,
                    bytes_moved / 1024
                );
                return Ok(true);
            }

            if chunk.is_last {
                debug!(
                    "{}.{}: ~{} KiB moved",
                    database,
                    table,
                    bytes_moved / 1024
                );
                return Ok(false);
            }
        }
    }
}
