//! Source connectors.
//!
//! One reader per source file. The ODBC-backed Access reader is compiled
//! behind the `odbc` feature; the CSV reader is always available and treats
//! a `.csv` file as a single-table database.

#[cfg(feature = "odbc")]
pub mod access;
pub mod csv;

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};
use crate::ident;
use crate::traits::SourceReader;

/// A lock file younger than this indicates the database is in active use.
const LOCK_FILE_MAX_AGE: Duration = Duration::from_secs(600);

/// Fault categories a source driver error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFault {
    /// The file is briefly held by another process or session.
    TransientLock,

    /// The file is structurally damaged; retrying cannot help.
    Corruption,

    /// The driver ran out of handles; reopen before retrying.
    HandleExhaustion,

    /// Anything else.
    Other,
}

/// Classify a Jet/ACE driver error message.
///
/// The engine reports faults as free text; these phrases are stable across
/// driver versions (they correspond to Jet error codes 3009/3045/3049/3343/
/// 3035/3048).
pub fn classify_source_error(message: &str) -> SourceFault {
    let msg = message.to_lowercase();

    if msg.contains("could not lock")
        || msg.contains("already in use")
        || msg.contains("exclusively locked")
        || msg.contains("file already in use")
        || msg.contains("could not use")
        || msg.contains("locked by another")
    {
        return SourceFault::TransientLock;
    }

    if msg.contains("unrecognized database format")
        || msg.contains("is not a database")
        || msg.contains("corrupt")
        || msg.contains("isn't a valid")
    {
        return SourceFault::Corruption;
    }

    if msg.contains("cannot open any more")
        || msg.contains("system resource exceeded")
        || msg.contains("too many client tasks")
    {
        return SourceFault::HandleExhaustion;
    }

    SourceFault::Other
}

/// Turn a driver error message into the matching [`MigrateError`].
pub fn source_error(path: &Path, message: String) -> MigrateError {
    let display = path.display().to_string();
    match classify_source_error(&message) {
        SourceFault::TransientLock => MigrateError::SourceLocked {
            path: display,
            attempts: 0,
        },
        SourceFault::Corruption => MigrateError::SourceCorrupted {
            path: display,
            detail: message,
        },
        SourceFault::HandleExhaustion => MigrateError::HandleExhausted(message),
        SourceFault::Other => MigrateError::Source(format!("{}: {}", display, message)),
    }
}

/// Check for a recent Jet/ACE lock file next to the source.
///
/// A fresh `.ldb`/`.laccdb` means another session holds the database;
/// stale ones get left behind by crashed sessions and are ignored.
pub fn lock_file_recent(db_path: &Path) -> bool {
    for ext in ["ldb", "laccdb"] {
        let lock_file = db_path.with_extension(ext);
        if let Ok(meta) = std::fs::metadata(&lock_file) {
            let age = meta
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok());
            if age.is_some_and(|a| a < LOCK_FILE_MAX_AGE) {
                return true;
            }
        }
    }
    false
}

/// Derive the sanitized database identifier from a source file path.
pub fn database_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    ident::sanitize(&stem)
}

/// Open the reader matching a source file's extension.
///
/// `.csv` files always work; `.mdb`/`.accdb` need the `odbc` feature.
pub async fn open_source(path: &Path, config: &SourceConfig) -> Result<Box<dyn SourceReader>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => Ok(Box::new(csv::CsvReader::open(path).await?)),
        #[cfg(feature = "odbc")]
        "mdb" | "accdb" => Ok(Box::new(
            access::AccessReader::open(path, config.lock_retry.clone()).await?,
        )),
        #[cfg(not(feature = "odbc"))]
        "mdb" | "accdb" => {
            let _ = config;
            Err(MigrateError::Config(format!(
                "{}: Access files need the `odbc` feature (built without it)",
                path.display()
            )))
        }
        other => Err(MigrateError::Config(format!(
            "{}: unsupported source extension '{}'",
            path.display(),
            other
        ))),
    }
}
