//! Worker request shapes consumed by the configuration compiler.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Compatibility date applied when a worker does not pin one.
pub const DEFAULT_COMPATIBILITY_DATE: &str = "2023-02-28";

/// One tenant unit: code modules, bindings, and the routes it claims.
///
/// Specs are rebuilt from desired state on every reload generation and
/// are never patched in place.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSpec {
    /// Display name. Mangled into a config-safe identifier by the compiler.
    pub name: String,
    pub compatibility_date: String,
    pub compatibility_flags: Vec<String>,
    /// Ordered modules. The first one is the worker's main module.
    pub modules: Vec<ModuleSpec>,
    pub bindings: Vec<BindingSpec>,
    pub routes: Vec<RouteSpec>,
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compatibility_date: DEFAULT_COMPATIBILITY_DATE.to_string(),
            compatibility_flags: Vec::new(),
            modules: Vec::new(),
            bindings: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: ModuleSpec) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_binding(mut self, binding: BindingSpec) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn with_route(mut self, route: RouteSpec) -> Self {
        self.routes.push(route);
        self
    }
}

/// Module flavours understood by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[serde(rename = "esmodule")]
    EsModule,
    Wasm,
    Json,
    Text,
    Data,
}

impl ModuleKind {
    /// Guess the module kind from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "js" | "mjs" => Some(ModuleKind::EsModule),
            "wasm" => Some(ModuleKind::Wasm),
            "json" => Some(ModuleKind::Json),
            "txt" | "html" | "md" => Some(ModuleKind::Text),
            "bin" | "data" => Some(ModuleKind::Data),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::EsModule => "esmodule",
            ModuleKind::Wasm => "wasm",
            ModuleKind::Json => "json",
            ModuleKind::Text => "text",
            ModuleKind::Data => "data",
        }
    }
}

/// A code or data module. Content is always written out as an artifact
/// and embedded by path, never inlined.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSpec {
    /// Specifier the worker imports this module by.
    pub import_name: String,
    pub kind: ModuleKind,
    pub content: Vec<u8>,
}

impl ModuleSpec {
    pub fn new(
        import_name: impl Into<String>,
        kind: ModuleKind,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            import_name: import_name.into(),
            kind,
            content: content.into(),
        }
    }

    pub fn esmodule(import_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(import_name, ModuleKind::EsModule, source.into().into_bytes())
    }
}

/// A named value or capability injected into a worker's environment.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingSpec {
    Text {
        name: String,
        value: String,
    },
    /// Binary payload. `file_name` pins the artifact name (used for
    /// content-addressed site files); otherwise a random id is generated.
    Data {
        name: String,
        value: Vec<u8>,
        file_name: Option<String>,
    },
    Json {
        name: String,
        value: serde_json::Value,
    },
    Service {
        name: String,
        service: String,
    },
    FromEnvironment {
        name: String,
        var: String,
    },
    /// Binding produced by an extension module, configured by its own
    /// nested bindings.
    Wrapped {
        name: String,
        module_name: String,
        entrypoint: String,
        inner: Vec<BindingSpec>,
    },
}

impl BindingSpec {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        BindingSpec::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn json(name: impl Into<String>, value: serde_json::Value) -> Self {
        BindingSpec::Json {
            name: name.into(),
            value,
        }
    }

    pub fn service(name: impl Into<String>, service: impl Into<String>) -> Self {
        BindingSpec::Service {
            name: name.into(),
            service: service.into(),
        }
    }

    pub fn data(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        BindingSpec::Data {
            name: name.into(),
            value: value.into(),
            file_name: None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BindingSpec::Text { name, .. }
            | BindingSpec::Data { name, .. }
            | BindingSpec::Json { name, .. }
            | BindingSpec::Service { name, .. }
            | BindingSpec::FromEnvironment { name, .. }
            | BindingSpec::Wrapped { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BindingSpec::Text { .. } => "text",
            BindingSpec::Data { .. } => "data",
            BindingSpec::Json { .. } => "json",
            BindingSpec::Service { .. } => "service",
            BindingSpec::FromEnvironment { .. } => "fromEnvironment",
            BindingSpec::Wrapped { .. } => "wrapped",
        }
    }
}

/// A host plus the path prefixes a worker serves on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub host: String,
    pub paths: Vec<String>,
}

impl RouteSpec {
    pub fn new(host: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            host: host.into(),
            paths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worker_uses_default_date() {
        let spec = WorkerSpec::new("blog");
        assert_eq!(spec.compatibility_date, DEFAULT_COMPATIBILITY_DATE);
        assert!(spec.modules.is_empty());
    }

    #[test]
    fn module_kind_from_extension() {
        assert_eq!(ModuleKind::from_path(Path::new("a/index.mjs")), Some(ModuleKind::EsModule));
        assert_eq!(ModuleKind::from_path(Path::new("lib.wasm")), Some(ModuleKind::Wasm));
        assert_eq!(ModuleKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn binding_name_covers_every_variant() {
        let wrapped = BindingSpec::Wrapped {
            name: "KV".to_string(),
            module_name: "workgrid:kv".to_string(),
            entrypoint: "default".to_string(),
            inner: vec![BindingSpec::text("namespace", "cache")],
        };
        assert_eq!(wrapped.name(), "KV");
        assert_eq!(wrapped.kind(), "wrapped");
        assert_eq!(BindingSpec::data("BLOB", vec![0u8, 1]).name(), "BLOB");
    }

    #[test]
    fn module_kind_serde_names() {
        let kind: ModuleKind = serde_json::from_str("\"esmodule\"").unwrap();
        assert_eq!(kind, ModuleKind::EsModule);
        assert_eq!(serde_json::to_string(&ModuleKind::Wasm).unwrap(), "\"wasm\"");
    }
}
