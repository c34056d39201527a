//! Pipeline orchestrator: discovers source files, drives one database
//! migration at a time, and assembles the final report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::progress::{run_status_renderer, ProgressTracker};
use crate::report::{DatabaseOutcome, DatabaseStatus, MigrationReport};
use crate::source::open_source;
use crate::target::MysqlTarget;
use crate::traits::TargetStore;
use crate::transfer::{TransferConfig, TransferEngine};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    target: Arc<MysqlTarget>,
    progress: Arc<ProgressTracker>,
}

impl Orchestrator {
    /// Create a new orchestrator and connect to the target server.
    pub async fn new(config: Config) -> Result<Self> {
        let target = MysqlTarget::new(&config.target).await?;
        Ok(Self {
            config,
            target: Arc::new(target),
            progress: Arc::new(ProgressTracker::new()),
        })
    }

    /// Recursively enumerate source files under a root path.
    ///
    /// Unreadable directories are logged and skipped; the scan result is
    /// sorted so processing order is deterministic.
    pub fn discover_source_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping unreadable path: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| {
                        let ext = ext.to_string_lossy().to_lowercase();
                        extensions.iter().any(|want| want.eq_ignore_ascii_case(&ext))
                    })
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Run the migration.
    ///
    /// Always produces a complete report, including when the run is
    /// cancelled part-way; the caller maps `report.tier()` to an exit code.
    pub async fn run(self, cancel: CancellationToken) -> Result<MigrationReport> {
        let started_at = Utc::now();

        let files = Self::discover_source_files(
            &self.config.source.root_dir,
            &self.config.source.extensions,
        );
        self.progress.add_databases_found(files.len() as u64);
        info!(
            "Found {} source files under {}",
            files.len(),
            self.config.source.root_dir.display()
        );

        // The renderer gets its own token so it also stops on normal
        // completion, not only on operator cancel.
        let renderer_cancel = cancel.child_token();
        let renderer = if self.config.migration.status_renderer {
            Some(tokio::spawn(run_status_renderer(
                self.progress.clone(),
                std::time::Duration::from_secs(self.config.migration.status_interval_secs.max(1)),
                renderer_cancel.clone(),
            )))
        } else {
            None
        };

        for path in &files {
            if cancel.is_cancelled() {
                info!("Cancellation requested, no further databases will start");
                break;
            }
            let outcome = self.migrate_database(path, &cancel).await;
            self.progress.record_database(outcome);
        }

        renderer_cancel.cancel();
        if let Some(handle) = renderer {
            let _ = handle.await;
        }

        let report = self.progress.finalize(started_at, cancel.is_cancelled());
        self.write_artifacts(&report)?;

        info!(
            "Migration {:?}: {} databases, {} rows in {:.1}s",
            report.tier(),
            report.totals.databases_processed,
            report.totals.rows_processed,
            report.duration_seconds
        );

        self.target.close().await;
        Ok(report)
    }

    /// Migrate a single source database. Failures are contained here; a
    /// database that cannot be opened or read fails alone.
    async fn migrate_database(&self, path: &Path, cancel: &CancellationToken) -> DatabaseOutcome {
        let name = crate::source::database_id_for(path);
        info!("Processing database: {}", path.display());

        let source = match open_source(path, &self.config.source).await {
            Ok(source) => source,
            Err(e) => {
                error!("{}: cannot open - {}", path.display(), e);
                return DatabaseOutcome::failed(name, path.display().to_string(), e.to_string());
            }
        };

        let engine = TransferEngine::new(
            Arc::from(source),
            self.target.clone() as Arc<dyn TargetStore>,
            TransferConfig {
                chunk_size: self.config.migration.chunk_size,
                row_ceiling: self.config.migration.row_ceiling,
            },
            self.progress.clone(),
            cancel.clone(),
        );

        match engine.run().await {
            Ok(tables) => DatabaseOutcome {
                name,
                path: path.display().to_string(),
                status: DatabaseStatus::Completed,
                error: None,
                tables,
            },
            Err(e) => {
                error!("{}: failed - {}", path.display(), e);
                DatabaseOutcome::failed(name, path.display().to_string(), e.to_string())
            }
        }
    }

    /// Write the report artifacts. Both files are written exactly once, at
    /// run end.
    fn write_artifacts(&self, report: &MigrationReport) -> Result<()> {
        let dir = &self.config.migration.report_dir;
        std::fs::create_dir_all(dir)?;

        let json_path = dir.join("report.json");
        std::fs::write(&json_path, report.to_json()?)?;

        let summary_path = dir.join("summary.txt");
        std::fs::write(&summary_path, report.render_summary())?;

        info!(
            "Report written to {} and {}",
            json_path.display(),
            summary_path.display()
        );
        Ok(())
    }
}
