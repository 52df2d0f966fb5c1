//! Artifact store: files embedded by the configuration document.
//!
//! Layout on disk is `<config dir>/artifacts/<namespace>/<file>`; the
//! document refers to the same files by the relative embed path
//! `artifacts/<namespace>/<file>`.

use std::path::{Component, Path};

use indexmap::IndexMap;
use tracing::debug;
use workgrid_core::ModuleKind;

use crate::error::{ConfigError, ConfigResult};

/// Directory (relative to the config file) holding every namespace.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Relative path the document uses to embed a file.
pub fn embed_path(namespace: &str, name: &str) -> String {
    format!("{ARTIFACTS_DIR}/{namespace}/{name}")
}

/// Raw bytes of one embedded file.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFile {
    pub name: String,
    pub content: Vec<u8>,
    pub kind: ModuleKind,
}

/// A file together with the namespace it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub namespace: String,
    pub file: ArtifactFile,
}

impl Artifact {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        kind: ModuleKind,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            file: ArtifactFile {
                name: name.into(),
                content: content.into(),
                kind,
            },
        }
    }

    pub fn embed_path(&self) -> String {
        embed_path(&self.namespace, &self.file.name)
    }
}

/// Check that a namespace or file name stays inside its directory.
pub(crate) fn check_relative(name: &str) -> ConfigResult<()> {
    let path = Path::new(name);
    let ok = !name.is_empty()
        && !name.contains('\\')
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidPath(name.to_string()))
    }
}

/// Namespace → ordered files. Adding a file that already exists under the
/// same namespace and name replaces it.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    namespaces: IndexMap<String, IndexMap<String, ArtifactFile>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, artifact: Artifact) {
        self.namespaces
            .entry(artifact.namespace)
            .or_default()
            .insert(artifact.file.name.clone(), artifact.file);
    }

    pub fn extend(&mut self, artifacts: impl IntoIterator<Item = Artifact>) {
        for artifact in artifacts {
            self.add(artifact);
        }
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<&ArtifactFile> {
        self.namespaces.get(namespace)?.get(name)
    }

    /// Whether a document embed path resolves to a stored file.
    pub fn contains_embed(&self, path: &str) -> bool {
        path.strip_prefix(ARTIFACTS_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.split_once('/'))
            .is_some_and(|(namespace, name)| self.get(namespace, name).is_some())
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.namespaces.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every file under `<root>/artifacts/`, replacing whatever a
    /// previous generation left there. Returns the number of files written.
    pub fn write_to(&self, root: &Path) -> ConfigResult<usize> {
        let base = root.join(ARTIFACTS_DIR);
        if base.exists() {
            std::fs::remove_dir_all(&base).map_err(|e| ConfigError::io(&base, e))?;
        }

        let mut written = 0;
        for (namespace, files) in &self.namespaces {
            check_relative(namespace)?;
            let dir = base.join(namespace);
            for file in files.values() {
                check_relative(&file.name)?;
                let path = dir.join(&file.name);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
                }
                std::fs::write(&path, &file.content).map_err(|e| ConfigError::io(&path, e))?;
                written += 1;
            }
            debug!(%namespace, files = files.len(), "artifacts written");
        }
        Ok(written)
    }
}
