//! Outcome and report types.
//!
//! The report is append-only while the run is in flight and frozen exactly
//! once at the end, whether the run completed normally or was interrupted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-table transfer decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDecision {
    /// Target table absent: create schema, insert everything.
    Create,

    /// Target exists with a different row count: upsert the difference.
    Update,

    /// Row counts match: treated as already current.
    Skip,
}

/// Terminal status of one table transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Freshly created and fully loaded.
    Completed,

    /// Existing table brought up to date.
    Updated,

    /// Nothing to do.
    Skipped,

    /// Transfer stopped at the row ceiling; rows_written == ceiling.
    Partial,

    /// Transfer failed; rows already written are preserved.
    Failed,
}

/// Outcome of one table transfer. Recorded exactly once per table; the
/// terminal status is never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOutcome {
    /// Sanitized table name.
    pub table: String,

    /// Decision computed before the transfer started.
    pub decision: TransferDecision,

    /// Estimated source row count at discovery.
    pub rows_source: u64,

    /// Rows actually written this run.
    pub rows_written: u64,

    /// Terminal status.
    pub status: TableStatus,

    /// Wall-clock duration of the transfer.
    pub duration_seconds: f64,

    /// Failure detail, present when status is failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Non-fatal annotations (lossy type mappings, ceiling notices).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Status of one source database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStatus {
    Completed,
    Failed,
}

/// Outcome of one source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseOutcome {
    /// Sanitized database name.
    pub name: String,

    /// Source file path.
    pub path: String,

    /// Whether the database was processed or failed to open/connect.
    pub status: DatabaseStatus,

    /// Failure detail for database-level failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Per-table outcomes in processing order.
    pub tables: Vec<TableOutcome>,
}

impl DatabaseOutcome {
    /// Build a database-level failure with no table outcomes.
    pub fn failed(name: impl Into<String>, path: impl Into<String>, error: String) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            status: DatabaseStatus::Failed,
            error: Some(error),
            tables: Vec::new(),
        }
    }
}

/// Aggregate counters over the whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateTotals {
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

/// Three-tier run outcome, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTier {
    /// Everything transferred.
    Success,

    /// Some tables or databases failed, some data moved.
    PartialSuccess,

    /// Nothing was transferred.
    Failure,
}

impl RunTier {
    /// Process exit code for this tier.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunTier::Success => 0,
            RunTier::PartialSuccess => 1,
            RunTier::Failure => 2,
        }
    }
}

/// Final report for one migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed (or was interrupted).
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Whether the run was cancelled by the operator.
    pub cancelled: bool,

    /// Per-database outcomes in processing order.
    pub databases: Vec<DatabaseOutcome>,

    /// Aggregate counters.
    pub totals: AggregateTotals,
}

impl MigrationReport {
    /// Classify the run into the three-tier outcome.
    pub fn tier(&self) -> RunTier {
        let t = &self.totals;
        let any_failure = t.databases_failed > 0 || t.tables_failed > 0 || self.cancelled;
        let any_progress =
            t.rows_processed > 0 || t.tables_skipped > 0 || t.tables_completed > 0;

        if !any_failure {
            RunTier::Success
        } else if any_progress {
            RunTier::PartialSuccess
        } else {
            RunTier::Failure
        }
    }

    /// Convert to a pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render the human-readable summary derived from the same data.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        out.push_str("ACCESS TO MYSQL MIGRATION SUMMARY\n");
        out.push_str("=================================\n\n");
        out.push_str(&format!("Run ID:     {}\n", self.run_id));
        out.push_str(&format!("Started:    {}\n", self.started_at));
        out.push_str(&format!("Finished:   {}\n", self.completed_at));
        out.push_str(&format!("Duration:   {:.1}s\n", self.duration_seconds));
        if self.cancelled {
            out.push_str("Run was cancelled by the operator.\n");
        }

        let t = &self.totals;
        out.push_str("\nTotals:\n");
        out.push_str(&format!(
            "  Databases: {} found, {} processed, {} failed\n",
            t.databases_found, t.databases_processed, t.databases_failed
        ));
        out.push_str(&format!(
            "  Tables:    {} completed, {} updated, {} skipped, {} partial, {} failed\n",
            t.tables_completed, t.tables_updated, t.tables_skipped, t.tables_partial,
            t.tables_failed
        ));
        out.push_str(&format!(
            "  Rows:      {} processed, {} failed\n",
            t.rows_processed, t.rows_failed
        ));

        for db in &self.databases {
            out.push_str(&format!("\nDatabase {} ({})\n", db.name, db.path));
            if let Some(err) = &db.error {
                out.push_str(&format!("  FAILED: {}\n", err));
            }
            for table in &db.tables {
                out.push_str(&format!(
                    "  {:<32} {:>10} rows  {:?} -> {:?} ({:.1}s)\n",
                    table.table,
                    table.rows_written,
                    table.decision,
                    table.status,
                    table.duration_seconds
                ));
                if let Some(err) = &table.error {
                    out.push_str(&format!("      error: {}\n", err));
                }
                for warning in &table.warnings {
                    out.push_str(&format!("      warning: {}\n", warning));
                }
            }
        }

        out
    }
}
