//! Error types for manifest and settings loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading manifests, settings, or site directories.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid json value for binding {binding}: {source}")]
    Json {
        binding: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("path {0} must be relative and stay inside the worker directory")]
    PathEscapes(String),

    #[error("cannot infer module type for {0}; set `type` explicitly")]
    UnknownModuleType(String),

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}
