//! End-to-end generation tests.
//!
//! Builds a realistic state directory (capability bindings, data files,
//! static sites, multiple routes) and checks the written generation as a
//! whole: embed paths resolve, the router agrees with its route table,
//! and every tenant carries its reserved bindings once.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use workgrid_config::document::BindingValue;
use workgrid_config::ConfigError;
use workgrid_reload::{compile, DesiredState, DriverConfig, ReloadError};

const BLOG: &str = r#"
[worker]
name = "My Blog"
compatibility_flags = ["nodejs_compat"]

[[modules]]
name = "index.js"
path = "src/index.js"

[[modules]]
name = "lib/render.js"
path = "src/render.js"

[[bindings]]
type = "kv"
name = "CACHE"
namespace = "blog-cache"

[[bindings]]
type = "site"
name = "ASSETS"
directory = "public"

[[bindings]]
type = "data"
name = "LOGO"
path = "logo.bin"

[[routes]]
host = "blog.example.com"

[[routes]]
host = "example.com"
paths = ["/blog"]
"#;

const API: &str = r#"
[worker]
name = "api"

[[modules]]
name = "main.js"
path = "main.js"

[[bindings]]
type = "queue"
name = "JOBS"
queue = "jobs"

[[bindings]]
type = "env"
name = "TOKEN"
var = "API_TOKEN"

[[routes]]
host = "api.example.com"
paths = ["/v1", "/v2"]
"#;

fn state_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let blog = dir.path().join("workers/blog");
    fs::create_dir_all(blog.join("src")).unwrap();
    fs::create_dir_all(blog.join("public/css")).unwrap();
    fs::write(blog.join("worker.toml"), BLOG).unwrap();
    fs::write(blog.join("src/index.js"), "import { render } from './lib/render.js'; export default {}").unwrap();
    fs::write(blog.join("src/render.js"), "export function render() {}").unwrap();
    fs::write(blog.join("public/index.html"), "<h1>blog</h1>").unwrap();
    fs::write(blog.join("public/css/site.css"), "h1 { color: red }").unwrap();
    fs::write(blog.join("public/copy.html"), "<h1>blog</h1>").unwrap();
    fs::write(blog.join("logo.bin"), [0u8, 1, 2, 255]).unwrap();

    let api = dir.path().join("workers/api");
    fs::create_dir_all(&api).unwrap();
    fs::write(api.join("worker.toml"), API).unwrap();
    fs::write(api.join("main.js"), "export default {}").unwrap();
    dir
}

fn driver_config(root: &Path) -> DriverConfig {
    DriverConfig {
        worker_id: "node-7".to_string(),
        listen: "*:8080".to_string(),
        admin_api: "127.0.0.1:8000".to_string(),
        state_dir: root.join("workers"),
        config_path: root.join("gen/config.capnp"),
        sockets: Vec::new(),
        seed: Some(11),
    }
}

/// Every `embed "<path>"` occurrence in rendered text.
fn embedded_paths(rendered: &str) -> Vec<PathBuf> {
    rendered
        .split("embed \"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(PathBuf::from)
        .collect()
}

#[test]
fn written_generation_is_complete() {
    let dir = state_dir();
    let config = driver_config(dir.path());
    let state = DesiredState::load(&config.state_dir).unwrap();
    let (configurator, identifiers) = compile(&config, &state).unwrap();
    configurator.write_config(&config.config_path).unwrap();

    let rendered = fs::read_to_string(&config.config_path).unwrap();
    let embeds = embedded_paths(&rendered);
    assert!(!embeds.is_empty());
    for embed in &embeds {
        let path = dir.path().join("gen").join(embed);
        assert!(path.is_file(), "missing artifact {}", path.display());
    }

    // identical site files share one artifact
    let data_files = fs::read_dir(dir.path().join("gen/artifacts/__data")).unwrap().count();
    assert_eq!(data_files, 2 + 1);

    // relative import between tenant modules still resolves on disk
    let blog = identifiers.iter().find(|id| id.starts_with("myblog")).unwrap();
    assert!(dir.path().join(format!("gen/artifacts/{blog}/lib/render.js")).is_file());
}

#[test]
fn router_matches_route_table() {
    let dir = state_dir();
    let config = driver_config(dir.path());
    let state = DesiredState::load(&config.state_dir).unwrap();
    let (configurator, identifiers) = compile(&config, &state).unwrap();

    let meta = configurator.router_meta();
    assert_eq!(meta.id, "node-7");
    assert_eq!(meta.routes.len(), 3);

    let router = configurator.document().worker("router").unwrap();
    let bound: BTreeSet<&str> = router
        .bindings()
        .filter_map(|b| match b.value() {
            BindingValue::Service(service) => Some(service.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(bound, meta.services());
    assert_eq!(bound, identifiers.iter().map(String::as_str).collect());
}

#[test]
fn every_tenant_has_reserved_bindings_once() {
    let dir = state_dir();
    let config = driver_config(dir.path());
    let state = DesiredState::load(&config.state_dir).unwrap();
    let (configurator, identifiers) = compile(&config, &state).unwrap();

    for id in &identifiers {
        let worker = configurator.document().worker(id).unwrap();
        for reserved in ["__router", "__meta", "__admin"] {
            let count = worker.bindings().filter(|b| b.name() == reserved).count();
            assert_eq!(count, 1, "{id} has {count} {reserved} bindings");
        }
        assert_eq!(worker.modules()[0].name(), "__entry.js");
        assert_eq!(worker.modules()[1].name(), "__worker.js");
    }
}

#[test]
fn reserved_name_in_manifest_aborts_generation() {
    let dir = state_dir();
    let manifest = dir.path().join("workers/api/worker.toml");
    let mut content = fs::read_to_string(&manifest).unwrap();
    content.push_str("\n[[bindings]]\ntype = \"text\"\nname = \"__admin\"\nvalue = \"nope\"\n");
    fs::write(&manifest, content).unwrap();

    let config = driver_config(dir.path());
    let state = DesiredState::load(&config.state_dir).unwrap();
    let err = compile(&config, &state).unwrap_err();
    assert!(matches!(
        err,
        ReloadError::Config(ConfigError::ReservedBinding { ref binding, .. }) if binding == "__admin"
    ));
}
