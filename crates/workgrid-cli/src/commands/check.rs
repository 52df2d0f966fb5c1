//! `workgrid check`: validate manifests and the compiled document.

use anyhow::{bail, Result};
use workgrid_reload::{compile, DesiredState};

use super::NodeArgs;

pub fn check(node: &NodeArgs) -> Result<()> {
    let summary = summarize(node)?;
    for line in &summary {
        println!("{line}");
    }
    Ok(())
}

/// One line per worker: name, identifier and routes.
fn summarize(node: &NodeArgs) -> Result<Vec<String>> {
    let settings = node.settings()?;
    let state = DesiredState::load(&node.dir)?;
    if state.is_empty() {
        bail!("no workers found in {}", node.dir.display());
    }

    let config = node.driver_config(&settings, &settings.runtime.config_path);
    let (configurator, identifiers) = compile(&config, &state)?;
    // render runs the cross-reference validation
    configurator.render()?;

    Ok(state
        .workers
        .iter()
        .zip(identifiers)
        .map(|(worker, identifier)| {
            let hosts: Vec<&str> = worker.spec.routes.iter().map(|r| r.host.as_str()).collect();
            format!(
                "ok  {} -> {} ({} modules, {} bindings, routes: {})",
                worker.spec.name,
                identifier,
                worker.spec.modules.len(),
                worker.spec.bindings.len(),
                if hosts.is_empty() { "none".to_string() } else { hosts.join(", ") },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{node_args, write_worker};

    #[test]
    fn summarizes_each_worker() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path(), "blog", "blog");
        write_worker(dir.path(), "shop", "shop");

        let lines = summarize(&node_args(dir.path())).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ok  blog -> blog"));
        assert!(lines[1].contains("routes: shop.example.com"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(summarize(&node_args(dir.path())).is_err());
    }

    #[test]
    fn dangling_service_binding_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path(), "blog", "blog");
        let manifest = dir.path().join("blog/worker.toml");
        let mut content = std::fs::read_to_string(&manifest).unwrap();
        content.push_str("\n[[bindings]]\ntype = \"service\"\nname = \"API\"\nservice = \"missing\"\n");
        std::fs::write(&manifest, content).unwrap();

        let err = summarize(&node_args(dir.path())).unwrap_err();
        assert!(err.to_string().contains("missing"), "{err}");
    }
}
