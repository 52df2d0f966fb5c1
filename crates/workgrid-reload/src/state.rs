//! Desired state: the set of workers a node should be running.
//!
//! The state directory holds one subdirectory per worker, each with a
//! `worker.toml`. Subdirectories are read in name order so a given
//! directory always compiles to the same configuration.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use workgrid_core::manifest::MANIFEST_FILE;
use workgrid_core::{Manifest, WorkerSpec};

use crate::error::{ReloadError, ReloadResult};

#[derive(Debug, Clone)]
pub struct DesiredWorker {
    pub dir: PathBuf,
    pub spec: WorkerSpec,
}

#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub workers: Vec<DesiredWorker>,
}

impl DesiredState {
    /// Load every worker under `dir`. A `dir` that itself holds a
    /// manifest is a single-worker state. A missing directory is an empty
    /// state; any unreadable manifest fails the whole load.
    pub fn load(dir: &Path) -> ReloadResult<Self> {
        if dir.join(MANIFEST_FILE).is_file() {
            let worker = load_worker(dir.to_path_buf())?;
            return Ok(Self {
                workers: vec![worker],
            });
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "state directory missing; no workers");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ReloadError::Io {
                    path: dir.to_path_buf(),
                    source: e,
                });
            }
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ReloadError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden && path.join(MANIFEST_FILE).is_file() {
                dirs.push(path);
            }
        }
        dirs.sort();

        let workers = dirs
            .into_iter()
            .map(load_worker)
            .collect::<ReloadResult<Vec<_>>>()?;
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn specs(&self) -> impl Iterator<Item = &WorkerSpec> {
        self.workers.iter().map(|w| &w.spec)
    }
}

fn load_worker(dir: PathBuf) -> ReloadResult<DesiredWorker> {
    let spec = Manifest::from_file(&dir.join(MANIFEST_FILE))
        .and_then(|manifest| manifest.to_worker_spec(&dir))
        .map_err(|source| ReloadError::Manifest {
            dir: dir.clone(),
            source,
        })?;
    debug!(dir = %dir.display(), worker = %spec.name, "worker loaded");
    Ok(DesiredWorker { dir, spec })
}
