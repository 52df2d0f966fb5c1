//! worker.toml manifest parser.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::capability;
use crate::error::{CoreError, CoreResult};
use crate::types::{
    BindingSpec, ModuleKind, ModuleSpec, RouteSpec, WorkerSpec, DEFAULT_COMPATIBILITY_DATE,
};

/// File name of a worker manifest inside its directory.
pub const MANIFEST_FILE: &str = "worker.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub worker: WorkerSection,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    pub name: String,
    pub compatibility_date: Option<String>,
    pub compatibility_flags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Import name inside the worker.
    pub name: String,
    /// Source file, relative to the manifest directory.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: Option<ModuleKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindingEntry {
    Text { name: String, value: String },
    Json { name: String, value: toml::Value },
    Data { name: String, path: String },
    Service { name: String, service: String },
    Env { name: String, var: String },
    Kv { name: String, namespace: String },
    Queue { name: String, queue: String },
    Site { name: String, directory: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub host: String,
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,
}

fn default_paths() -> Vec<String> {
    vec!["/".to_string()]
}

impl Manifest {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        toml::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Resolve file references against `base_dir` and lower capability
    /// bindings into base binding shapes.
    pub fn to_worker_spec(&self, base_dir: &Path) -> CoreResult<WorkerSpec> {
        if self.worker.name.trim().is_empty() {
            return Err(CoreError::EmptyField { field: "worker.name" });
        }

        let mut spec = WorkerSpec::new(self.worker.name.clone());
        spec.compatibility_date = self
            .worker
            .compatibility_date
            .clone()
            .unwrap_or_else(|| DEFAULT_COMPATIBILITY_DATE.to_string());
        spec.compatibility_flags = self.worker.compatibility_flags.clone().unwrap_or_default();

        for entry in &self.modules {
            let path = resolve(base_dir, &entry.path)?;
            let kind = match entry.kind {
                Some(kind) => kind,
                None => ModuleKind::from_path(&path)
                    .ok_or_else(|| CoreError::UnknownModuleType(entry.path.clone()))?,
            };
            let content = std::fs::read(&path).map_err(|e| CoreError::io(&path, e))?;
            spec.modules.push(ModuleSpec::new(entry.name.clone(), kind, content));
        }

        for entry in &self.bindings {
            spec.bindings.push(lower_binding(entry, base_dir)?);
        }

        for route in &self.routes {
            if route.host.trim().is_empty() {
                return Err(CoreError::EmptyField { field: "routes.host" });
            }
            spec.routes.push(RouteSpec::new(route.host.clone(), route.paths.clone()));
        }

        Ok(spec)
    }
}

fn lower_binding(entry: &BindingEntry, base_dir: &Path) -> CoreResult<BindingSpec> {
    let binding = match entry {
        BindingEntry::Text { name, value } => BindingSpec::text(name, value),
        BindingEntry::Json { name, value } => BindingSpec::Json {
            name: name.clone(),
            value: serde_json::to_value(value).map_err(|source| CoreError::Json {
                binding: name.clone(),
                source,
            })?,
        },
        BindingEntry::Data { name, path } => {
            let path = resolve(base_dir, path)?;
            let value = std::fs::read(&path).map_err(|e| CoreError::io(&path, e))?;
            BindingSpec::data(name, value)
        }
        BindingEntry::Service { name, service } => BindingSpec::service(name, service),
        BindingEntry::Env { name, var } => BindingSpec::FromEnvironment {
            name: name.clone(),
            var: var.clone(),
        },
        BindingEntry::Kv { name, namespace } => capability::kv_binding(name, namespace),
        BindingEntry::Queue { name, queue } => capability::queue_binding(name, queue),
        BindingEntry::Site { name, directory } => {
            capability::site_binding(name, &resolve(base_dir, directory)?)?
        }
    };
    Ok(binding)
}

/// Join a manifest-relative path, refusing anything that climbs out.
fn resolve(base_dir: &Path, relative: &str) -> CoreResult<PathBuf> {
    let rel = Path::new(relative);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || relative.is_empty() {
        return Err(CoreError::PathEscapes(relative.to_string()));
    }
    Ok(base_dir.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BLOG: &str = r#"
[worker]
name = "My Blog"
compatibility_flags = ["nodejs_compat"]

[[modules]]
name = "index.js"
path = "src/index.js"

[[bindings]]
type = "text"
name = "GREETING"
value = "hello"

[[bindings]]
type = "json"
name = "SETTINGS"
value = { theme = "dark", posts = 3 }

[[bindings]]
type = "kv"
name = "CACHE"
namespace = "blog-cache"

[[routes]]
host = "blog.example.com"
"#;

    fn blog_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.js"), "export default {}").unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), BLOG).unwrap();
        dir
    }

    #[test]
    fn test_parse_minimal() {
        let manifest: Manifest = toml::from_str("[worker]\nname = \"x\"\n").unwrap();
        assert_eq!(manifest.worker.name, "x");
        assert!(manifest.modules.is_empty());
    }

    #[test]
    fn test_to_worker_spec() {
        let dir = blog_dir();
        let manifest = Manifest::from_file(&dir.path().join(MANIFEST_FILE)).unwrap();
        let spec = manifest.to_worker_spec(dir.path()).unwrap();

        assert_eq!(spec.name, "My Blog");
        assert_eq!(spec.compatibility_date, DEFAULT_COMPATIBILITY_DATE);
        assert_eq!(spec.compatibility_flags, vec!["nodejs_compat"]);
        assert_eq!(spec.modules[0].kind, ModuleKind::EsModule);
        assert_eq!(spec.modules[0].content, b"export default {}");
        assert_eq!(spec.bindings.len(), 3);
        assert_eq!(spec.bindings[1], BindingSpec::json("SETTINGS", serde_json::json!({"theme": "dark", "posts": 3})));
        assert_eq!(spec.bindings[2].kind(), "wrapped");
        assert_eq!(spec.routes, vec![RouteSpec::new("blog.example.com", vec!["/".to_string()])]);
    }

    #[test]
    fn test_rejects_escaping_module_path() {
        let dir = tempfile::tempdir().unwrap();
        let manifest: Manifest = toml::from_str(
            "[worker]\nname = \"x\"\n[[modules]]\nname = \"a.js\"\npath = \"../a.js\"\n",
        )
        .unwrap();
        let err = manifest.to_worker_spec(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::PathEscapes(_)));
    }

    #[test]
    fn test_unknown_module_type() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blob.xyz"), "x").unwrap();
        let manifest: Manifest = toml::from_str(
            "[worker]\nname = \"x\"\n[[modules]]\nname = \"blob\"\npath = \"blob.xyz\"\n",
        )
        .unwrap();
        let err = manifest.to_worker_spec(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownModuleType(_)));
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest: Manifest = toml::from_str("[worker]\nname = \" \"\n").unwrap();
        assert!(matches!(
            manifest.to_worker_spec(dir.path()),
            Err(CoreError::EmptyField { field: "worker.name" })
        ));
    }

    #[test]
    fn test_roundtrip_toml() {
        let dir = blog_dir();
        let manifest = Manifest::from_file(&dir.path().join(MANIFEST_FILE)).unwrap();
        let text = manifest.to_toml_string().unwrap();
        assert!(text.contains("blog-cache"));
    }
}
