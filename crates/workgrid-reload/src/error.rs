//! Reload driver error types.

use std::path::PathBuf;

use thiserror::Error;
use workgrid_config::ConfigError;
use workgrid_core::CoreError;
use workgrid_supervisor::SupervisorError;

/// Result type alias for reload operations.
pub type ReloadResult<T> = Result<T, ReloadError>;

/// Errors that abort a reload generation. The running runtime is left
/// as it was for every variant except `Supervisor`.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("worker {dir}: {source}")]
    Manifest {
        dir: PathBuf,
        #[source]
        source: CoreError,
    },

    #[error("settings: {0}")]
    Settings(#[from] CoreError),

    #[error("config generation failed: {0}")]
    Config(#[from] ConfigError),

    #[error("runtime restart failed: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("filesystem watch failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
