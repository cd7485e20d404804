use std::path::PathBuf;

use thiserror::Error;

/// Conditions that abort a whole run before anything is saved.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("destination table '{0}' not found; run 'init' first")]
    MissingTable(String),

    #[error("drive folder '{0}' is configured but no drive_token is set")]
    MissingCredential(String),

    #[error("documents directory not readable: {0}")]
    DocumentsDir(PathBuf),
}
