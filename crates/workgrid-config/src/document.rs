//! In-memory configuration document for the external runtime.
//!
//! Nodes are validated when they are constructed, so a node that exists
//! always renders to a complete field list. The document itself checks
//! cross references (services, workers, sockets) before rendering.

use std::collections::HashSet;

use indexmap::IndexMap;
use workgrid_core::ModuleKind;

use crate::error::{ConfigError, ConfigResult};
use crate::render::{block_list, embed, inline_list, quote, Fields};

fn require(value: &str, node: &'static str, field: &'static str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField { node, field });
    }
    Ok(())
}

// ── Modules ────────────────────────────────────────────────────────

/// A worker or extension module embedded from an artifact file.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    name: String,
    kind: ModuleKind,
    embed: String,
    internal: bool,
}

impl Module {
    pub fn new(
        name: impl Into<String>,
        kind: ModuleKind,
        embed_path: impl Into<String>,
    ) -> ConfigResult<Self> {
        let name = name.into();
        let embed = embed_path.into();
        require(&name, "module", "name")?;
        require(&embed, "module", "embed")?;
        Ok(Self {
            name,
            kind,
            embed,
            internal: false,
        })
    }

    /// Only importable by other extension modules and wrapped bindings.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn embed_path(&self) -> &str {
        &self.embed
    }

    pub fn render(&self) -> String {
        let key = match self.kind {
            ModuleKind::EsModule => "esModule",
            ModuleKind::Wasm => "wasm",
            ModuleKind::Json => "json",
            ModuleKind::Text => "text",
            ModuleKind::Data => "data",
        };
        let fields = Fields::new().string("name", &self.name).raw(key, embed(&self.embed));
        if self.internal {
            fields.raw("internal", "true").finish()
        } else {
            fields.finish()
        }
    }
}

// ── Bindings ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum BindingValue {
    Text(String),
    /// Embed path of the data artifact.
    Data(String),
    /// Serialized JSON text.
    Json(String),
    Service(String),
    FromEnvironment(String),
    Wrapped {
        module_name: String,
        entrypoint: String,
        inner: Vec<Binding>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    name: String,
    value: BindingValue,
}

impl Binding {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> ConfigResult<Self> {
        Self::build(name.into(), BindingValue::Text(value.into()))
    }

    pub fn data(name: impl Into<String>, embed_path: impl Into<String>) -> ConfigResult<Self> {
        let embed_path = embed_path.into();
        require(&embed_path, "data binding", "value")?;
        Self::build(name.into(), BindingValue::Data(embed_path))
    }

    pub fn json(name: impl Into<String>, value: &serde_json::Value) -> ConfigResult<Self> {
        Self::build(name.into(), BindingValue::Json(serde_json::to_string(value)?))
    }

    pub fn service(name: impl Into<String>, service: impl Into<String>) -> ConfigResult<Self> {
        let service = service.into();
        require(&service, "service binding", "service")?;
        Self::build(name.into(), BindingValue::Service(service))
    }

    pub fn from_environment(name: impl Into<String>, var: impl Into<String>) -> ConfigResult<Self> {
        let var = var.into();
        require(&var, "fromEnvironment binding", "fromEnvironment")?;
        Self::build(name.into(), BindingValue::FromEnvironment(var))
    }

    pub fn wrapped(
        name: impl Into<String>,
        module_name: impl Into<String>,
        entrypoint: impl Into<String>,
        inner: Vec<Binding>,
    ) -> ConfigResult<Self> {
        let module_name = module_name.into();
        let entrypoint = entrypoint.into();
        require(&module_name, "wrapped binding", "moduleName")?;
        require(&entrypoint, "wrapped binding", "entrypoint")?;
        let name = name.into();
        let mut seen = HashSet::new();
        if let Some(dup) = inner.iter().find(|b| !seen.insert(b.name())) {
            return Err(ConfigError::DuplicateInnerBinding {
                binding: name,
                inner: dup.name().to_string(),
            });
        }
        Self::build(
            name,
            BindingValue::Wrapped {
                module_name,
                entrypoint,
                inner,
            },
        )
    }

    fn build(name: String, value: BindingValue) -> ConfigResult<Self> {
        require(&name, "binding", "name")?;
        Ok(Self { name, value })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &BindingValue {
        &self.value
    }

    /// Embed paths referenced by this binding and any nested bindings.
    pub fn embed_paths(&self) -> Vec<&str> {
        match &self.value {
            BindingValue::Data(path) => vec![path.as_str()],
            BindingValue::Wrapped { inner, .. } => {
                inner.iter().flat_map(Binding::embed_paths).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn render(&self) -> String {
        let fields = Fields::new().string("name", &self.name);
        let fields = match &self.value {
            BindingValue::Text(value) => fields.string("text", value),
            BindingValue::Data(path) => fields.raw("data", embed(path)),
            BindingValue::Json(json) => fields.string("json", json),
            BindingValue::Service(service) => fields.string("service", service),
            BindingValue::FromEnvironment(var) => fields.string("fromEnvironment", var),
            BindingValue::Wrapped {
                module_name,
                entrypoint,
                inner,
            } => {
                let wrapped = Fields::new()
                    .string("moduleName", module_name)
                    .string("entrypoint", entrypoint)
                    .raw("innerBindings", inline_list(inner.iter().map(Binding::render)))
                    .finish();
                fields.raw("wrapped", wrapped)
            }
        };
        fields.finish()
    }
}

// ── Services ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStyle {
    Host,
    Proxy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    fn render(&self) -> String {
        Fields::new()
            .string("name", &self.name)
            .string("value", &self.value)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceKind {
    Worker {
        worker: String,
    },
    Network {
        allow: Vec<String>,
        deny: Vec<String>,
    },
    External {
        address: String,
        style: HttpStyle,
        inject_request_headers: Vec<Header>,
        inject_response_headers: Vec<Header>,
    },
    Disk {
        path: String,
        writable: bool,
        allow_dotfiles: bool,
    },
}

/// A named backend addressable from sockets and service bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    name: String,
    kind: ServiceKind,
}

impl Service {
    pub fn worker(name: impl Into<String>, worker: impl Into<String>) -> ConfigResult<Self> {
        let worker = worker.into();
        require(&worker, "worker service", "worker")?;
        Self::build(name.into(), ServiceKind::Worker { worker })
    }

    pub fn network(
        name: impl Into<String>,
        allow: Vec<String>,
        deny: Vec<String>,
    ) -> ConfigResult<Self> {
        Self::build(name.into(), ServiceKind::Network { allow, deny })
    }

    pub fn external(
        name: impl Into<String>,
        address: impl Into<String>,
        style: HttpStyle,
    ) -> ConfigResult<Self> {
        let address = address.into();
        require(&address, "external service", "address")?;
        Self::build(
            name.into(),
            ServiceKind::External {
                address,
                style,
                inject_request_headers: Vec::new(),
                inject_response_headers: Vec::new(),
            },
        )
    }

    pub fn disk(
        name: impl Into<String>,
        path: impl Into<String>,
        writable: bool,
        allow_dotfiles: bool,
    ) -> ConfigResult<Self> {
        let path = path.into();
        require(&path, "disk service", "path")?;
        Self::build(
            name.into(),
            ServiceKind::Disk {
                path,
                writable,
                allow_dotfiles,
            },
        )
    }

    /// Add a header injected into requests sent to an external service.
    /// No effect on other service kinds.
    pub fn with_request_header(mut self, name: &str, value: &str) -> Self {
        if let ServiceKind::External { inject_request_headers, .. } = &mut self.kind {
            inject_request_headers.push(Header {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        self
    }

    /// Add a header injected into responses from an external service.
    pub fn with_response_header(mut self, name: &str, value: &str) -> Self {
        if let ServiceKind::External { inject_response_headers, .. } = &mut self.kind {
            inject_response_headers.push(Header {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        self
    }

    fn build(name: String, kind: ServiceKind) -> ConfigResult<Self> {
        require(&name, "service", "name")?;
        Ok(Self { name, kind })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ServiceKind {
        &self.kind
    }

    pub fn render(&self) -> String {
        let fields = Fields::new().string("name", &self.name);
        let fields = match &self.kind {
            ServiceKind::Worker { worker } => fields.raw("worker", format!(".{worker}")),
            ServiceKind::Network { allow, deny } => fields.raw(
                "network",
                Fields::new()
                    .raw("allow", inline_list(allow.iter().map(|s| quote(s))))
                    .raw("deny", inline_list(deny.iter().map(|s| quote(s))))
                    .finish(),
            ),
            ServiceKind::External {
                address,
                style,
                inject_request_headers,
                inject_response_headers,
            } => {
                let style = match style {
                    HttpStyle::Host => "host",
                    HttpStyle::Proxy => "proxy",
                };
                let mut http = Fields::new().raw("style", style);
                if !inject_request_headers.is_empty() {
                    http = http.raw(
                        "injectRequestHeaders",
                        inline_list(inject_request_headers.iter().map(Header::render)),
                    );
                }
                if !inject_response_headers.is_empty() {
                    http = http.raw(
                        "injectResponseHeaders",
                        inline_list(inject_response_headers.iter().map(Header::render)),
                    );
                }
                fields.raw(
                    "external",
                    Fields::new()
                        .string("address", address)
                        .raw("http", http.finish())
                        .finish(),
                )
            }
            ServiceKind::Disk {
                path,
                writable,
                allow_dotfiles,
            } => fields.raw(
                "disk",
                Fields::new()
                    .string("path", path)
                    .raw("writable", writable.to_string())
                    .raw("allowDotfiles", allow_dotfiles.to_string())
                    .finish(),
            ),
        };
        fields.finish()
    }
}

// ── Sockets & extensions ───────────────────────────────────────────

/// An HTTP listen endpoint bound to one service.
#[derive(Debug, Clone, PartialEq)]
pub struct Socket {
    name: String,
    address: String,
    service: String,
}

impl Socket {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        service: impl Into<String>,
    ) -> ConfigResult<Self> {
        let socket = Self {
            name: name.into(),
            address: address.into(),
            service: service.into(),
        };
        require(&socket.name, "socket", "name")?;
        require(&socket.address, "socket", "address")?;
        require(&socket.service, "socket", "service")?;
        Ok(socket)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn render(&self) -> String {
        Fields::new()
            .string("name", &self.name)
            .string("address", &self.address)
            .raw("http", "()")
            .string("service", &self.service)
            .finish()
    }
}

/// A group of internal modules made available to wrapped bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    modules: Vec<Module>,
}

impl Extension {
    pub fn new(modules: Vec<Module>) -> ConfigResult<Self> {
        if modules.is_empty() {
            return Err(ConfigError::MissingField {
                node: "extension",
                field: "modules",
            });
        }
        Ok(Self { modules })
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn render(&self) -> String {
        Fields::new()
            .raw("modules", inline_list(self.modules.iter().map(Module::render)))
            .finish()
    }
}

// ── Workers ────────────────────────────────────────────────────────

/// Worker definition rendered as a top-level `const`.
#[derive(Debug, Clone, PartialEq)]
pub struct Worker {
    identifier: String,
    compatibility_date: String,
    compatibility_flags: Vec<String>,
    modules: Vec<Module>,
    bindings: IndexMap<String, Binding>,
}

impl Worker {
    pub fn new(
        identifier: impl Into<String>,
        compatibility_date: impl Into<String>,
    ) -> ConfigResult<Self> {
        let worker = Self {
            identifier: identifier.into(),
            compatibility_date: compatibility_date.into(),
            compatibility_flags: Vec::new(),
            modules: Vec::new(),
            bindings: IndexMap::new(),
        };
        require(&worker.identifier, "worker", "identifier")?;
        require(&worker.compatibility_date, "worker", "compatibilityDate")?;
        Ok(worker)
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.compatibility_flags = flags;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Append a module whose name must not already be taken.
    pub fn push_module(&mut self, module: Module) -> ConfigResult<()> {
        if self.modules.iter().any(|m| m.name == module.name) {
            return Err(ConfigError::DuplicateModule {
                worker: self.identifier.clone(),
                module: module.name,
            });
        }
        self.modules.push(module);
        Ok(())
    }

    /// Add a binding whose name must not already be taken.
    pub fn insert_binding(&mut self, binding: Binding) -> ConfigResult<()> {
        if self.bindings.contains_key(binding.name()) {
            return Err(ConfigError::DuplicateBinding {
                worker: self.identifier.clone(),
                binding: binding.name().to_string(),
            });
        }
        self.bindings.insert(binding.name().to_string(), binding);
        Ok(())
    }

    /// Replace a binding of the same name in place, or append it.
    pub fn upsert_binding(&mut self, binding: Binding) {
        self.bindings.insert(binding.name().to_string(), binding);
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn embed_paths(&self) -> Vec<&str> {
        self.modules
            .iter()
            .map(Module::embed_path)
            .chain(self.bindings.values().flat_map(Binding::embed_paths))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut fields = vec![format!("compatibilityDate = {}", quote(&self.compatibility_date))];
        if !self.compatibility_flags.is_empty() {
            fields.push(format!(
                "compatibilityFlags = {}",
                inline_list(self.compatibility_flags.iter().map(|f| quote(f)))
            ));
        }
        let modules: Vec<String> = self.modules.iter().map(Module::render).collect();
        let bindings: Vec<String> = self.bindings.values().map(Binding::render).collect();
        fields.push(format!("modules = {}", block_list(&modules, 1)));
        fields.push(format!("bindings = {}", block_list(&bindings, 1)));

        format!(
            "const {} :Workerd.Worker = (\n  {}\n);\n",
            self.identifier,
            fields.join(",\n  ")
        )
    }
}

// ── Document ───────────────────────────────────────────────────────

const HEADER: &str = "# generated by workgrid; do not edit\nusing Workerd = import \"/workerd/workerd.capnp\";\n";

/// Aggregate of everything the runtime loads. Output order follows
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    services: IndexMap<String, Service>,
    sockets: Vec<Socket>,
    extensions: Vec<Extension>,
    workers: IndexMap<String, Worker>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(&mut self, service: Service) -> ConfigResult<()> {
        if self.services.contains_key(service.name()) {
            return Err(ConfigError::DuplicateService(service.name().to_string()));
        }
        self.services.insert(service.name().to_string(), service);
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn add_socket(&mut self, socket: Socket) {
        self.sockets.push(socket);
    }

    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    pub fn add_extension(&mut self, extension: Extension) {
        self.extensions.push(extension);
    }

    pub fn has_extension_module(&self, name: &str) -> bool {
        self.extensions
            .iter()
            .flat_map(Extension::modules)
            .any(|m| m.name() == name)
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn add_worker(&mut self, worker: Worker) -> ConfigResult<()> {
        if self.workers.contains_key(worker.identifier()) {
            return Err(ConfigError::DuplicateWorker(worker.identifier().to_string()));
        }
        self.workers.insert(worker.identifier().to_string(), worker);
        Ok(())
    }

    pub fn worker(&self, identifier: &str) -> Option<&Worker> {
        self.workers.get(identifier)
    }

    pub fn worker_mut(&mut self, identifier: &str) -> Option<&mut Worker> {
        self.workers.get_mut(identifier)
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    /// Every artifact path the rendered document embeds.
    pub fn embed_paths(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .flat_map(Extension::modules)
            .map(Module::embed_path)
            .chain(self.workers.values().flat_map(Worker::embed_paths))
            .collect()
    }

    /// Check that every cross reference resolves.
    pub fn validate(&self) -> ConfigResult<()> {
        for service in self.services.values() {
            if let ServiceKind::Worker { worker } = service.kind() {
                if !self.workers.contains_key(worker) {
                    return Err(ConfigError::UnknownWorker {
                        referrer: format!("service {}", service.name()),
                        worker: worker.clone(),
                    });
                }
            }
        }
        for socket in &self.sockets {
            self.check_service(&format!("socket {}", socket.name()), socket.service())?;
        }
        for worker in self.workers.values() {
            for binding in worker.bindings() {
                self.check_binding(worker.identifier(), binding)?;
            }
        }
        Ok(())
    }

    fn check_binding(&self, worker: &str, binding: &Binding) -> ConfigResult<()> {
        match binding.value() {
            BindingValue::Service(service) => {
                self.check_service(&format!("{worker}.{}", binding.name()), service)
            }
            BindingValue::Wrapped { module_name, inner, .. } => {
                if !self.has_extension_module(module_name) {
                    return Err(ConfigError::UnknownExtension {
                        binding: binding.name().to_string(),
                        module: module_name.clone(),
                    });
                }
                inner.iter().try_for_each(|b| self.check_binding(worker, b))
            }
            _ => Ok(()),
        }
    }

    fn check_service(&self, referrer: &str, service: &str) -> ConfigResult<()> {
        if self.services.contains_key(service) {
            Ok(())
        } else {
            Err(ConfigError::UnknownService {
                referrer: referrer.to_string(),
                service: service.to_string(),
            })
        }
    }

    /// Render the whole document. Fails without output if any cross
    /// reference is dangling.
    pub fn render(&self) -> ConfigResult<String> {
        self.validate()?;

        let services: Vec<String> = self.services.values().map(Service::render).collect();
        let sockets: Vec<String> = self.sockets.iter().map(Socket::render).collect();
        let extensions: Vec<String> = self.extensions.iter().map(Extension::render).collect();

        let mut out = String::from(HEADER);
        out.push_str("\nconst config :Workerd.Config = (\n");
        out.push_str(&format!("  services = {},\n", block_list(&services, 1)));
        out.push_str(&format!("  sockets = {},\n", block_list(&sockets, 1)));
        out.push_str(&format!("  extensions = {}\n", block_list(&extensions, 1)));
        out.push_str(");\n");

        for worker in self.workers.values() {
            out.push('\n');
            out.push_str(&worker.render());
        }
        Ok(out)
    }
}
