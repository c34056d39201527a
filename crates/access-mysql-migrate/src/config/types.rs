//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source file discovery configuration.
    pub source: SourceConfig,

    /// Target database (MySQL) configuration.
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root directory scanned recursively for source files.
    pub root_dir: PathBuf,

    /// File extensions to pick up (without dot).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Retry policy applied to locked source files.
    #[serde(default)]
    pub lock_retry: RetryPolicy,
}

/// Target database (MySQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per chunk (default: 1,000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum rows transferred for one table in one run (default: 500,000).
    /// Tables beyond the ceiling are flagged partial, never silently cut.
    #[serde(default = "default_row_ceiling")]
    pub row_ceiling: u64,

    /// Seconds between status renderer updates (default: 10).
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    /// Whether the background status renderer runs (default: true).
    #[serde(default = "default_true")]
    pub status_renderer: bool,

    /// Directory the report artifacts are written to (default: "reports").
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            row_ceiling: default_row_ceiling(),
            status_interval_secs: default_status_interval(),
            status_renderer: true,
            report_dir: default_report_dir(),
        }
    }
}

// Default value functions for serde

fn default_extensions() -> Vec<String> {
    vec!["mdb".to_string(), "accdb".to_string()]
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_max_connections() -> usize {
    4
}

fn default_chunk_size() -> usize {
    1_000
}

fn default_row_ceiling() -> u64 {
    500_000
}

fn default_status_interval() -> u64 {
    10
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_true() -> bool {
    true
}
