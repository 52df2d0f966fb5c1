//! Capability bindings backed by the internal extension modules.
//!
//! A capability binding is sugar over a `wrapped` binding: the extension
//! module receives public parameters (namespace, queue name, file table)
//! next to a private service handle for the admin API.

use std::collections::BTreeMap;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};
use crate::types::BindingSpec;

/// Extension module implementing key-value namespaces.
pub const KV_MODULE: &str = "workgrid:kv";
/// Extension module serving static sites from data bindings.
pub const SITES_MODULE: &str = "workgrid:sites";
/// Extension module publishing to queues.
pub const QUEUES_MODULE: &str = "workgrid:queues";

/// Name of the admin API service in the rendered configuration.
pub const ADMIN_SERVICE: &str = "admin";

/// Inner binding carrying the admin API handle into an extension.
const ADMIN_INNER_BINDING: &str = "admin";

const DEFAULT_ENTRYPOINT: &str = "default";

/// Key-value namespace binding.
pub fn kv_binding(name: &str, namespace: &str) -> BindingSpec {
    BindingSpec::Wrapped {
        name: name.to_string(),
        module_name: KV_MODULE.to_string(),
        entrypoint: DEFAULT_ENTRYPOINT.to_string(),
        inner: vec![
            BindingSpec::text("namespace", namespace),
            BindingSpec::service(ADMIN_INNER_BINDING, ADMIN_SERVICE),
        ],
    }
}

/// Queue producer binding.
pub fn queue_binding(name: &str, queue: &str) -> BindingSpec {
    BindingSpec::Wrapped {
        name: name.to_string(),
        module_name: QUEUES_MODULE.to_string(),
        entrypoint: DEFAULT_ENTRYPOINT.to_string(),
        inner: vec![
            BindingSpec::text("queue", queue),
            BindingSpec::service(ADMIN_INNER_BINDING, ADMIN_SERVICE),
        ],
    }
}

/// Static site binding for every file under `directory`.
///
/// Files are content-addressed: each distinct file becomes one data
/// binding whose artifact is named after its SHA-256, so the same file
/// shipped by many deployments is stored once. A `manifest` json binding
/// maps request paths to those hashes.
pub fn site_binding(name: &str, directory: &Path) -> CoreResult<BindingSpec> {
    let mut manifest = BTreeMap::new();
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(directory).to_path_buf();
            CoreError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let content =
            std::fs::read(entry.path()).map_err(|e| CoreError::io(entry.path(), e))?;
        let hash = hex::encode(Sha256::digest(&content));

        let relative = entry
            .path()
            .strip_prefix(directory)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        manifest.insert(format!("/{relative}"), hash.clone());
        files.entry(hash).or_insert(content);
    }

    let mut inner = vec![BindingSpec::Json {
        name: "manifest".to_string(),
        value: serde_json::to_value(&manifest).map_err(|source| CoreError::Json {
            binding: name.to_string(),
            source,
        })?,
    }];
    for (hash, content) in files {
        inner.push(BindingSpec::Data {
            name: format!("sha256_{hash}"),
            value: content,
            file_name: Some(format!("{hash}.data")),
        });
    }

    Ok(BindingSpec::Wrapped {
        name: name.to_string(),
        module_name: SITES_MODULE.to_string(),
        entrypoint: DEFAULT_ENTRYPOINT.to_string(),
        inner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn kv_binding_carries_admin_handle() {
        let binding = kv_binding("CACHE", "cache-ns");
        match binding {
            BindingSpec::Wrapped { module_name, inner, .. } => {
                assert_eq!(module_name, KV_MODULE);
                assert_eq!(inner[0], BindingSpec::text("namespace", "cache-ns"));
                assert_eq!(inner[1], BindingSpec::service("admin", ADMIN_SERVICE));
            }
            other => panic!("expected wrapped binding, got {other:?}"),
        }
    }

    #[test]
    fn site_binding_dedupes_identical_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(dir.path().join("copy.html"), "<h1>hi</h1>").unwrap();
        fs::write(dir.path().join("assets/app.css"), "body{}").unwrap();

        let binding = site_binding("SITE", dir.path()).unwrap();
        let BindingSpec::Wrapped { module_name, inner, .. } = binding else {
            panic!("expected wrapped binding");
        };
        assert_eq!(module_name, SITES_MODULE);

        // manifest + two distinct contents
        assert_eq!(inner.len(), 3);
        let BindingSpec::Json { value, .. } = &inner[0] else {
            panic!("expected manifest first");
        };
        assert_eq!(value["/index.html"], value["/copy.html"]);
        assert!(value.get("/assets/app.css").is_some());

        for binding in &inner[1..] {
            let BindingSpec::Data { name, file_name, .. } = binding else {
                panic!("expected data binding");
            };
            let hash = name.strip_prefix("sha256_").unwrap();
            assert_eq!(file_name.as_deref(), Some(format!("{hash}.data").as_str()));
        }
    }

    #[test]
    fn site_binding_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = site_binding("SITE", &dir.path().join("nope"));
        assert!(matches!(result, Err(CoreError::Io { .. })));
    }
}
