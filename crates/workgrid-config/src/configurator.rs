//! Configurator: builds one configuration generation.
//!
//! A `Configurator` owns the document and the artifact store for a single
//! runtime generation. Construction sets up the fixed parts (router,
//! admin API, extensions); [`Configurator::add_worker`] is the only way to
//! add tenants afterwards and keeps the router's route table in step with
//! the worker services it can dispatch to.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};
use workgrid_core::capability::ADMIN_SERVICE;
use workgrid_core::{BindingSpec, ModuleKind, ModuleSpec, WorkerSpec, DEFAULT_COMPATIBILITY_DATE};

use crate::artifacts::{Artifact, ArtifactStore};
use crate::compile::{compile_binding, compile_module};
use crate::document::{Binding, ConfigDocument, Extension, HttpStyle, Module, Service, Socket, Worker};
use crate::error::{ConfigError, ConfigResult};
use crate::names::{mangle, Entropy};
use crate::router::{RouteEntry, RouterMeta};
use crate::scripts;

/// Identifier, service name and artifact namespace of the router worker.
pub const ROUTER: &str = "router";
/// Name of the tenant traffic socket.
pub const HTTP_SOCKET: &str = "http";
/// Namespace for router, entrypoint and extension sources.
pub const INTERNAL_NAMESPACE: &str = "__internal";

/// Module name of the entrypoint wrapper placed first in every worker.
pub const ENTRY_MODULE: &str = "__entry.js";
/// Import name the tenant's main module is renamed to.
pub const TENANT_MAIN_MODULE: &str = "__worker.js";

pub const ROUTER_BINDING: &str = "__router";
pub const META_BINDING: &str = "__meta";
pub const ADMIN_BINDING: &str = "__admin";
/// Binding names synthesized on every tenant worker.
pub const RESERVED_BINDINGS: [&str; 3] = [ROUTER_BINDING, META_BINDING, ADMIN_BINDING];

const ROUTER_SCRIPT_FILE: &str = "router.js";
const ENTRY_SCRIPT_FILE: &str = "entry.js";
const ROUTER_MODULE: &str = "router.js";

/// Suffix draws before a mangled name is declared a collision.
const MAX_IDENTIFIER_ATTEMPTS: usize = 16;

#[derive(Debug)]
pub struct Configurator {
    worker_id: String,
    document: ConfigDocument,
    artifacts: ArtifactStore,
    router_meta: RouterMeta,
    entropy: Entropy,
    identifiers: HashSet<String>,
}

impl Configurator {
    /// Start a generation with OS randomness for generated names.
    pub fn new(
        worker_id: &str,
        listen_address: &str,
        admin_api_address: &str,
    ) -> ConfigResult<Self> {
        Self::with_entropy(worker_id, listen_address, admin_api_address, Entropy::Os)
    }

    pub fn with_entropy(
        worker_id: &str,
        listen_address: &str,
        admin_api_address: &str,
        entropy: Entropy,
    ) -> ConfigResult<Self> {
        let mut configurator = Self {
            worker_id: worker_id.to_string(),
            document: ConfigDocument::new(),
            artifacts: ArtifactStore::new(),
            router_meta: RouterMeta::new(worker_id),
            entropy,
            identifiers: HashSet::new(),
        };

        configurator.init_router(listen_address)?;
        configurator.ensure_admin_service(admin_api_address)?;
        configurator.init_extensions()?;

        debug!(worker_id, listen_address, admin_api_address, "configurator initialized");
        Ok(configurator)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn router_meta(&self) -> &RouterMeta {
        &self.router_meta
    }

    fn init_router(&mut self, listen_address: &str) -> ConfigResult<()> {
        let script = Artifact::new(
            INTERNAL_NAMESPACE,
            ROUTER_SCRIPT_FILE,
            ModuleKind::EsModule,
            scripts::ROUTER.as_bytes(),
        );
        let mut router = Worker::new(ROUTER, DEFAULT_COMPATIBILITY_DATE)?;
        router.push_module(Module::new(ROUTER_MODULE, ModuleKind::EsModule, script.embed_path())?)?;
        router.upsert_binding(Binding::json(META_BINDING, &self.router_meta.to_json())?);

        self.artifacts.add(script);
        self.identifiers.insert(ROUTER.to_string());
        self.document.add_worker(router)?;
        self.ensure_router_service()?;
        self.document.add_socket(Socket::new(HTTP_SOCKET, listen_address, ROUTER)?);
        Ok(())
    }

    /// Router service, created on first use.
    fn ensure_router_service(&mut self) -> ConfigResult<&Service> {
        if self.document.service(ROUTER).is_none() {
            self.document.add_service(Service::worker(ROUTER, ROUTER)?)?;
        }
        self.document
            .service(ROUTER)
            .ok_or_else(|| ConfigError::UnknownService {
                referrer: "configurator".to_string(),
                service: ROUTER.to_string(),
            })
    }

    /// Admin API service, created on first use. Later calls return the
    /// existing service regardless of `address`.
    pub fn ensure_admin_service(&mut self, address: &str) -> ConfigResult<&Service> {
        if self.document.service(ADMIN_SERVICE).is_none() {
            let service = Service::external(ADMIN_SERVICE, address, HttpStyle::Host)?
                .with_request_header("x-workgrid-node", &self.worker_id);
            self.document.add_service(service)?;
        }
        self.document
            .service(ADMIN_SERVICE)
            .ok_or_else(|| ConfigError::UnknownService {
                referrer: "configurator".to_string(),
                service: ADMIN_SERVICE.to_string(),
            })
    }

    /// Register the entrypoint wrapper and every capability extension,
    /// skipping anything already present.
    fn init_extensions(&mut self) -> ConfigResult<()> {
        self.artifacts.add(Artifact::new(
            INTERNAL_NAMESPACE,
            ENTRY_SCRIPT_FILE,
            ModuleKind::EsModule,
            scripts::ENTRY.as_bytes(),
        ));

        for script in scripts::EXTENSIONS {
            if self.document.has_extension_module(script.module) {
                continue;
            }
            let artifact = Artifact::new(
                INTERNAL_NAMESPACE,
                script.file,
                ModuleKind::EsModule,
                script.source.as_bytes(),
            );
            let module = Module::new(script.module, ModuleKind::EsModule, artifact.embed_path())?.internal();
            self.document.add_extension(Extension::new(vec![module])?);
            self.artifacts.add(artifact);
        }
        Ok(())
    }

    /// Add one tenant worker: compile its modules and bindings, attach the
    /// reserved bindings, create its service, and claim its routes on the
    /// router. Returns the worker's identifier (also its service name).
    ///
    /// Nothing is committed to the document unless every step succeeds.
    pub fn add_worker(&mut self, spec: &WorkerSpec) -> ConfigResult<String> {
        if spec.modules.is_empty() {
            return Err(ConfigError::EmptyWorker(spec.name.clone()));
        }
        for binding in &spec.bindings {
            if RESERVED_BINDINGS.contains(&binding.name()) {
                return Err(ConfigError::ReservedBinding {
                    worker: spec.name.clone(),
                    binding: binding.name().to_string(),
                });
            }
            self.check_extensions(binding)?;
        }
        if spec.routes.iter().any(|route| route.host.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                node: "route",
                field: "host",
            });
        }

        let identifier = self.allocate_identifier(&spec.name)?;
        let mut worker = Worker::new(identifier.clone(), spec.compatibility_date.clone())?
            .with_flags(spec.compatibility_flags.clone());
        let mut artifacts = Vec::new();

        let entry = crate::artifacts::embed_path(INTERNAL_NAMESPACE, ENTRY_SCRIPT_FILE);
        worker.push_module(Module::new(ENTRY_MODULE, ModuleKind::EsModule, entry)?)?;

        for (index, module) in spec.modules.iter().enumerate() {
            let compiled = if index == 0 {
                let main = ModuleSpec {
                    import_name: TENANT_MAIN_MODULE.to_string(),
                    ..module.clone()
                };
                compile_module(&main, &identifier)?
            } else {
                compile_module(module, &identifier)?
            };
            let name = compiled.node.name().to_string();
            worker.push_module(compiled.node).map_err(|_| ConfigError::DuplicateModule {
                worker: spec.name.clone(),
                module: name,
            })?;
            artifacts.extend(compiled.artifacts);
        }

        for binding in &spec.bindings {
            let compiled = compile_binding(binding, &mut self.entropy)?;
            worker.insert_binding(compiled.node).map_err(|_| ConfigError::DuplicateBinding {
                worker: spec.name.clone(),
                binding: binding.name().to_string(),
            })?;
            artifacts.extend(compiled.artifacts);
        }

        worker.insert_binding(Binding::service(ROUTER_BINDING, ROUTER)?)?;
        worker.insert_binding(Binding::json(
            META_BINDING,
            &serde_json::json!({ "id": self.worker_id, "name": spec.name }),
        )?)?;
        worker.insert_binding(Binding::service(ADMIN_BINDING, ADMIN_SERVICE)?)?;

        let service = Service::worker(identifier.clone(), identifier.clone())?;

        // Commit.
        self.document.add_worker(worker)?;
        self.document.add_service(service)?;
        self.identifiers.insert(identifier.clone());
        self.artifacts.extend(artifacts);

        for route in &spec.routes {
            self.router_meta.push(RouteEntry {
                host: route.host.clone(),
                paths: route.paths.clone(),
                service: identifier.clone(),
                worker_name: spec.name.clone(),
            });
            self.upsert_router_meta()?;
            self.router_mut()?.upsert_binding(Binding::service(identifier.clone(), identifier.clone())?);
        }

        info!(
            worker = %spec.name,
            identifier = %identifier,
            modules = spec.modules.len(),
            bindings = spec.bindings.len(),
            routes = spec.routes.len(),
            "worker added"
        );
        Ok(identifier)
    }

    /// Re-serialize the route table into the router's `__meta` binding,
    /// replacing the previous one.
    pub fn upsert_router_meta(&mut self) -> ConfigResult<()> {
        let meta = Binding::json(META_BINDING, &self.router_meta.to_json())?;
        self.router_mut()?.upsert_binding(meta);
        Ok(())
    }

    fn router_mut(&mut self) -> ConfigResult<&mut Worker> {
        self.document
            .worker_mut(ROUTER)
            .ok_or_else(|| ConfigError::UnknownWorker {
                referrer: "configurator".to_string(),
                worker: ROUTER.to_string(),
            })
    }

    fn check_extensions(&self, binding: &BindingSpec) -> ConfigResult<()> {
        if let BindingSpec::Wrapped {
            name,
            module_name,
            inner,
            ..
        } = binding
        {
            if !self.document.has_extension_module(module_name) {
                return Err(ConfigError::UnknownExtension {
                    binding: name.clone(),
                    module: module_name.clone(),
                });
            }
            for nested in inner {
                self.check_extensions(nested)?;
            }
        }
        Ok(())
    }

    /// Mangle `name` and draw suffixes until the identifier is unused.
    fn allocate_identifier(&mut self, name: &str) -> ConfigResult<String> {
        for _ in 0..MAX_IDENTIFIER_ATTEMPTS {
            let candidate = mangle(name, self.entropy.suffix());
            let taken = self.identifiers.contains(&candidate)
                || self.document.service(&candidate).is_some();
            if !taken {
                return Ok(candidate);
            }
            debug!(%name, %candidate, "identifier collision, redrawing suffix");
        }
        Err(ConfigError::IdentifierCollision(name.to_string()))
    }

    /// Render the document after checking that every embedded path has
    /// an artifact behind it.
    pub fn render(&self) -> ConfigResult<String> {
        let rendered = self.document.render()?;
        if let Some(missing) = self
            .document
            .embed_paths()
            .into_iter()
            .find(|path| !self.artifacts.contains_embed(path))
        {
            return Err(ConfigError::MissingArtifact(missing.to_string()));
        }
        Ok(rendered)
    }

    /// Write artifacts next to `path`, then the rendered document to
    /// `path`. Rendering happens first so a structural error leaves the
    /// previous generation on disk untouched.
    pub fn write_config(&self, path: &Path) -> ConfigResult<()> {
        let rendered = self.render()?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::io(dir, e))?;

        if std::fs::symlink_metadata(path).is_ok() {
            std::fs::remove_file(path).map_err(|e| ConfigError::io(path, e))?;
        }

        let files = self.artifacts.write_to(dir)?;
        std::fs::write(path, rendered).map_err(|e| ConfigError::io(path, e))?;

        info!(
            path = %path.display(),
            artifacts = files,
            workers = self.document.workers().count() - 1,
            "configuration written"
        );
        Ok(())
    }
}
