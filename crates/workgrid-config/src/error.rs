//! Configuration compiler error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration compiler operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building or writing a configuration generation.
///
/// Everything except `Io` is a structural problem with the requested
/// workers: the generation is abandoned and nothing is written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{node} is missing required field `{field}`")]
    MissingField {
        node: &'static str,
        field: &'static str,
    },

    #[error("service already defined: {0}")]
    DuplicateService(String),

    #[error("worker already defined: {0}")]
    DuplicateWorker(String),

    #[error("worker {worker} declares binding {binding} more than once")]
    DuplicateBinding { worker: String, binding: String },

    #[error("wrapped binding {binding} declares inner binding {inner} more than once")]
    DuplicateInnerBinding { binding: String, inner: String },

    #[error("worker {worker} declares module {module} more than once")]
    DuplicateModule { worker: String, module: String },

    #[error("worker {worker} uses reserved binding name {binding}")]
    ReservedBinding { worker: String, binding: String },

    #[error("binding {binding} wraps unknown extension module {module}")]
    UnknownExtension { binding: String, module: String },

    #[error("{referrer} references unknown service {service}")]
    UnknownService { referrer: String, service: String },

    #[error("{referrer} references unknown worker {worker}")]
    UnknownWorker { referrer: String, worker: String },

    #[error("no free identifier for worker {0}")]
    IdentifierCollision(String),

    #[error("invalid module or artifact path: {0}")]
    InvalidPath(String),

    #[error("worker {0} has no modules")]
    EmptyWorker(String),

    #[error("embedded path {0} has no artifact")]
    MissingArtifact(String),

    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}
