//! Process-wide progress counters and the cooperative status renderer.
//!
//! The tracker is the only state touched from two logical actors: the
//! transfer path increments, the renderer task reads. Counters are atomics
//! and outcome lists sit behind a mutex taken only for short appends, so
//! neither side ever holds a lock across source/target I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::report::{
    AggregateTotals, DatabaseOutcome, DatabaseStatus, MigrationReport, TableOutcome, TableStatus,
};

/// Point-in-time view of the counters, safe to read while transfers run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressSnapshot {
    pub databases_found: u64,
    pub databases_processed: u64,
    pub databases_failed: u64,
    pub tables_completed: u64,
    pub tables_updated: u64,
    pub tables_skipped: u64,
    pub tables_partial: u64,
    pub tables_failed: u64,
    pub rows_processed: u64,
    pub rows_failed: u64,
}

/// Shared, thread-safe progress state for one migration run.
///
/// Exposes increment/read operations only; there is no way to reach the raw
/// fields from outside.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    databases_found: AtomicU64,
    databases_processed: AtomicU64,
    databases_failed: AtomicU64,
    tables_completed: AtomicU64,
    tables_updated: AtomicU64,
    tables_skipped: AtomicU64,
    tables_partial: AtomicU64,
    tables_failed: AtomicU64,
    rows_processed: AtomicU64,
    rows_failed: AtomicU64,
    databases: Mutex<Vec<DatabaseOutcome>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register discovered source files.
    pub fn add_databases_found(&self, count: u64) {
        self.databases_found.fetch_add(count, Ordering::Relaxed);
    }

    /// Count rows moved by an in-flight transfer (called per chunk).
    pub fn add_rows_processed(&self, rows: u64) {
        self.rows_processed.fetch_add(rows, Ordering::Relaxed);
    }

    /// Fold a finished table into the counters.
    ///
    /// The outcome itself is carried inside its [`DatabaseOutcome`]; this
    /// only maintains the aggregate view the renderer reads.
    pub fn count_table(&self, outcome: &TableOutcome) {
        match outcome.status {
            TableStatus::Completed => self.tables_completed.fetch_add(1, Ordering::Relaxed),
            TableStatus::Updated => self.tables_updated.fetch_add(1, Ordering::Relaxed),
            TableStatus::Skipped => self.tables_skipped.fetch_add(1, Ordering::Relaxed),
            TableStatus::Partial => self.tables_partial.fetch_add(1, Ordering::Relaxed),
            TableStatus::Failed => {
                self.rows_failed
                    .fetch_add(outcome.rows_source.saturating_sub(outcome.rows_written), Ordering::Relaxed);
                self.tables_failed.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    /// Record a finished database with all of its table outcomes.
    /// Append-only; outcomes are never revisited.
    pub fn record_database(&self, outcome: DatabaseOutcome) {
        match outcome.status {
            DatabaseStatus::Completed => {
                self.databases_processed.fetch_add(1, Ordering::Relaxed);
            }
            DatabaseStatus::Failed => {
                self.databases_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.databases.lock().unwrap().push(outcome);
    }

    /// Read a consistent-enough snapshot for display. Individual counters
    /// are atomic; the snapshot as a whole may straddle an in-flight chunk,
    /// which is fine for a status line.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            databases_found: self.databases_found.load(Ordering::Relaxed),
            databases_processed: self.databases_processed.load(Ordering::Relaxed),
            databases_failed: self.databases_failed.load(Ordering::Relaxed),
            tables_completed: self.tables_completed.load(Ordering::Relaxed),
            tables_updated: self.tables_updated.load(Ordering::Relaxed),
            tables_skipped: self.tables_skipped.load(Ordering::Relaxed),
            tables_partial: self.tables_partial.load(Ordering::Relaxed),
            tables_failed: self.tables_failed.load(Ordering::Relaxed),
            rows_processed: self.rows_processed.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
        }
    }

    /// Freeze everything into the final report. Called exactly once, on
    /// normal completion or after cancellation.
    pub fn finalize(&self, started_at: DateTime<Utc>, cancelled: bool) -> MigrationReport {
        let completed_at = Utc::now();
        let snap = self.snapshot();
        let databases = std::mem::take(&mut *self.databases.lock().unwrap());

        MigrationReport {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            cancelled,
            databases,
            totals: AggregateTotals {
                databases_found: snap.databases_found,
                databases_processed: snap.databases_processed,
                databases_failed: snap.databases_failed,
                tables_completed: snap.tables_completed,
                tables_updated: snap.tables_updated,
                tables_skipped: snap.tables_skipped,
                tables_partial: snap.tables_partial,
                tables_failed: snap.tables_failed,
                rows_processed: snap.rows_processed,
                rows_failed: snap.rows_failed,
            },
        }
    }
}

/// Cooperative status renderer.
///
/// Logs a snapshot line on a fixed interval until cancelled. Runs as its
/// own task and only ever reads the tracker, so it never blocks the
/// transfer path.
pub async fn run_status_renderer(
    tracker: std::sync::Arc<ProgressTracker>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so the first line appears
    // after one full interval of actual work.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let s = tracker.snapshot();
                info!(
                    "progress: databases {}/{} ({} failed) | tables {} completed, {} updated, {} skipped, {} partial, {} failed | rows {}",
                    s.databases_processed,
                    s.databases_found,
                    s.databases_failed,
                    s.tables_completed,
                    s.tables_updated,
                    s.tables_skipped,
                    s.tables_partial,
                    s.tables_failed,
                    s.rows_processed,
                );
            }
        }
    }
}
