//! # access-mysql-migrate
//!
//! Migration library for moving legacy MS Access database files (`.mdb`,
//! `.accdb`) and standalone CSV exports into a MySQL server, without prior
//! knowledge of the source schema.
//!
//! The pipeline provides:
//!
//! - **Source discovery** under a root directory
//! - **Type mapping** from Access/Jet column types to MySQL
//! - **Update-aware chunked transfer** (create / update / skip per table)
//! - **Lock retry** with bounded exponential backoff for busy source files
//! - **Progress tracking** and a write-once structured report
//!
//! ## Example
//!
//! ```rust,no_run
//! use access_mysql_migrate::{Config, Orchestrator, Result};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let report = orchestrator.run(CancellationToken::new()).await?;
//!     println!("{}", report.render_summary());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod ident;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod retry;
pub mod source;
pub mod target;
pub mod transfer;
pub mod traits;
pub mod typemap;
pub mod value;

// Re-exports for convenient access
pub use catalog::{CatalogEntry, ColumnDescriptor, NativeType};
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::Orchestrator;
pub use progress::ProgressTracker;
pub use report::{MigrationReport, RunTier, TableOutcome, TableStatus, TransferDecision};
pub use traits::{SourceReader, TargetStore, TargetTableState};
pub use transfer::{TransferConfig, TransferEngine};
pub use value::{RowChunk, SqlValue};
