//! Configuration validation.

use crate::error::{MigrateError, Result};

use super::Config;

/// Validate a parsed configuration before any connection is opened.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.root_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config(
            "source.root_dir must not be empty".to_string(),
        ));
    }

    if config.source.extensions.is_empty() {
        return Err(MigrateError::Config(
            "source.extensions must list at least one extension".to_string(),
        ));
    }

    if config.target.host.is_empty() {
        return Err(MigrateError::Config(
            "target.host must not be empty".to_string(),
        ));
    }

    if config.target.user.is_empty() {
        return Err(MigrateError::Config(
            "target.user must not be empty".to_string(),
        ));
    }

    if config.migration.chunk_size == 0 {
        return Err(MigrateError::Config(
            "migration.chunk_size must be at least 1".to_string(),
        ));
    }

    if config.migration.row_ceiling == 0 {
        return Err(MigrateError::Config(
            "migration.row_ceiling must be at least 1".to_string(),
        ));
    }

    if config.source.lock_retry.max_attempts == 0 {
        return Err(MigrateError::Config(
            "source.lock_retry.max_attempts must be at least 1".to_string(),
        ));
    }

    Ok(())
}
