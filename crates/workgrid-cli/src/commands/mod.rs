pub mod check;
pub mod dev;
pub mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use workgrid_core::Settings;
use workgrid_reload::DriverConfig;

/// Options shared by every command that compiles a worker directory.
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Worker directory, or a directory of worker directories
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,
    /// Node settings file (workgrid.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override `network.listen`.
    #[arg(long)]
    pub listen: Option<String>,
    /// Seed for generated identifiers, for reproducible output.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl NodeArgs {
    /// Settings from `--config` (or defaults) with flag overrides applied.
    /// The state directory is always `--dir`.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load_or_default(self.config.as_deref())
            .with_context(|| format!("loading settings from {:?}", self.config))?;
        settings.state.dir = self.dir.clone();
        if let Some(listen) = &self.listen {
            settings.network.listen = listen.clone();
        }
        Ok(settings)
    }

    pub fn driver_config(&self, settings: &Settings, config_path: &Path) -> DriverConfig {
        DriverConfig {
            config_path: config_path.to_path_buf(),
            seed: self.seed,
            ..DriverConfig::from_settings(settings)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a minimal single-route worker under `root/<dir>`.
    pub(crate) fn write_worker(root: &Path, dir: &str, name: &str) {
        let worker_dir = root.join(dir);
        std::fs::create_dir_all(&worker_dir).unwrap();
        std::fs::write(worker_dir.join("index.js"), "export default { fetch() {} }").unwrap();
        std::fs::write(
            worker_dir.join("worker.toml"),
            format!(
                "[worker]\nname = \"{name}\"\n\n[[modules]]\nname = \"index.js\"\npath = \"index.js\"\n\n[[routes]]\nhost = \"{name}.example.com\"\n"
            ),
        )
        .unwrap();
    }

    pub(crate) fn node_args(dir: &Path) -> NodeArgs {
        NodeArgs {
            dir: dir.to_path_buf(),
            config: None,
            listen: None,
            seed: Some(1),
        }
    }

    #[test]
    fn flags_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("workgrid.toml");
        std::fs::write(&config, "[network]\nlisten = \"*:9000\"\nadmin_api = \"10.0.0.1:8000\"\n").unwrap();

        let args = NodeArgs {
            dir: dir.path().join("workers"),
            config: Some(config),
            listen: Some("unix:/tmp/wg.sock".to_string()),
            seed: Some(3),
        };
        let settings = args.settings().unwrap();
        assert_eq!(settings.network.listen, "unix:/tmp/wg.sock");
        assert_eq!(settings.network.admin_api, "10.0.0.1:8000");

        let driver = args.driver_config(&settings, Path::new("/tmp/out/config.capnp"));
        assert_eq!(driver.state_dir, dir.path().join("workers"));
        assert_eq!(driver.sockets, vec![PathBuf::from("/tmp/wg.sock")]);
        assert_eq!(driver.seed, Some(3));
    }
}
