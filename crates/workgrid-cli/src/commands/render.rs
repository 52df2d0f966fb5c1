//! `workgrid render`: one-shot compile of a worker directory.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use workgrid_config::Configurator;
use workgrid_reload::{compile, DesiredState};

use super::NodeArgs;

pub fn render(node: &NodeArgs, out: Option<&Path>) -> Result<()> {
    let configurator = build(node, out.unwrap_or_else(|| Path::new("config.capnp")))?;
    match out {
        Some(path) => {
            configurator
                .write_config(path)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), artifacts = configurator.artifacts().len(), "config written");
        }
        None => print!("{}", configurator.render()?),
    }
    Ok(())
}

fn build(node: &NodeArgs, config_path: &Path) -> Result<Configurator> {
    let settings = node.settings()?;
    let state = DesiredState::load(&node.dir)?;
    let (configurator, identifiers) = compile(&node.driver_config(&settings, config_path), &state)?;
    for (worker, identifier) in state.workers.iter().zip(&identifiers) {
        info!(worker = %worker.spec.name, %identifier, dir = %worker.dir.display(), "compiled");
    }
    Ok(configurator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{node_args, write_worker};

    #[test]
    fn writes_config_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path(), "blog", "blog");
        let out = dir.path().join("out/config.capnp");

        render(&node_args(dir.path()), Some(&out)).unwrap();

        let rendered = std::fs::read_to_string(&out).unwrap();
        assert!(rendered.starts_with("# generated by workgrid"));
        assert!(rendered.contains("blog.example.com"));
        assert!(dir.path().join("out/artifacts/__internal/entry.js").is_file());
    }

    #[test]
    fn same_seed_builds_same_document() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path(), "a", "alpha");
        write_worker(dir.path(), "b", "beta");
        let args = node_args(dir.path());

        let first = build(&args, Path::new("config.capnp")).unwrap().render().unwrap();
        let second = build(&args, Path::new("config.capnp")).unwrap().render().unwrap();
        assert_eq!(first, second);
    }
}
