//! Binding and module compiler.
//!
//! Translates request shapes from `workgrid-core` into document nodes.
//! Anything that has to live in a file comes back as an [`Artifact`] next
//! to the node; callers must hand those to the [`ArtifactStore`] before
//! the configuration is written.
//!
//! [`ArtifactStore`]: crate::artifacts::ArtifactStore

use workgrid_core::{BindingSpec, ModuleKind, ModuleSpec};

use crate::artifacts::{check_relative, Artifact};
use crate::document::{Binding, Module};
use crate::error::ConfigResult;
use crate::names::{file_stem, Entropy};

/// Shared namespace for data binding payloads.
pub const DATA_NAMESPACE: &str = "__data";

/// A compiled node plus the files it embeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled<T> {
    pub node: T,
    pub artifacts: Vec<Artifact>,
}

impl<T> Compiled<T> {
    fn bare(node: T) -> Self {
        Self {
            node,
            artifacts: Vec::new(),
        }
    }
}

/// Compile one binding, recursing into wrapped inner bindings.
pub fn compile_binding(
    spec: &BindingSpec,
    entropy: &mut Entropy,
) -> ConfigResult<Compiled<Binding>> {
    let compiled = match spec {
        BindingSpec::Text { name, value } => Compiled::bare(Binding::text(name, value)?),
        BindingSpec::Json { name, value } => Compiled::bare(Binding::json(name, value)?),
        BindingSpec::Service { name, service } => Compiled::bare(Binding::service(name, service)?),
        BindingSpec::FromEnvironment { name, var } => {
            Compiled::bare(Binding::from_environment(name, var)?)
        }
        BindingSpec::Data {
            name,
            value,
            file_name,
        } => {
            let file_name = match file_name {
                Some(stable) => {
                    check_relative(stable)?;
                    stable.clone()
                }
                None => format!("{}_{}.data", file_stem(name), entropy.file_id()),
            };
            let artifact = Artifact::new(DATA_NAMESPACE, file_name, ModuleKind::Data, value.clone());
            Compiled {
                node: Binding::data(name, artifact.embed_path())?,
                artifacts: vec![artifact],
            }
        }
        BindingSpec::Wrapped {
            name,
            module_name,
            entrypoint,
            inner,
        } => {
            let mut nodes = Vec::with_capacity(inner.len());
            let mut artifacts = Vec::new();
            for binding in inner {
                let compiled = compile_binding(binding, entropy)?;
                nodes.push(compiled.node);
                artifacts.extend(compiled.artifacts);
            }
            Compiled {
                node: Binding::wrapped(name, module_name, entrypoint, nodes)?,
                artifacts,
            }
        }
    };
    Ok(compiled)
}

/// Compile a module into `namespace`. The artifact keeps the import name
/// as its file name so relative imports between modules still resolve.
pub fn compile_module(spec: &ModuleSpec, namespace: &str) -> ConfigResult<Compiled<Module>> {
    check_relative(&spec.import_name)?;
    let artifact = Artifact::new(namespace, spec.import_name.clone(), spec.kind, spec.content.clone());
    Ok(Compiled {
        node: Module::new(spec.import_name.clone(), spec.kind, artifact.embed_path())?,
        artifacts: vec![artifact],
    })
}
