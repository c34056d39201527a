//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source file is held by another process and stayed locked after
    /// exhausting the retry budget.
    #[error("Source file {path} is locked (gave up after {attempts} attempts)")]
    SourceLocked { path: String, attempts: u32 },

    /// Source file is structurally damaged. Never retried.
    #[error("Source file {path} is corrupted: {detail}")]
    SourceCorrupted { path: String, detail: String },

    /// The source driver ran out of handles/resources.
    #[error("Source connection exhausted: {0}")]
    HandleExhausted(String),

    /// Any other source-side read or catalog error.
    #[error("Source error: {0}")]
    Source(String),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] mysql_async::Error),

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse error from the CSV source connector
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Source error.
    pub fn source(message: impl Into<String>) -> Self {
        MigrateError::Source(message.into())
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// True for faults the source connector may retry after a backoff wait:
    /// a transient file lock, or handle exhaustion (each retry attempt opens
    /// a fresh connection, which is the reopen the latter requires).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrateError::SourceLocked { .. } | MigrateError::HandleExhausted(_)
        )
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
