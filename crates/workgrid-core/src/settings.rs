//! workgrid.toml node settings.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! usable single-node setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub node: NodeSettings,
    pub network: NetworkSettings,
    pub runtime: RuntimeSettings,
    pub state: StateSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Identifier baked into every worker's `__meta` binding.
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Tenant traffic socket: `host:port`, `*:port`, or `unix:/path`.
    pub listen: String,
    /// Address of the admin API reachable from capability extensions.
    pub admin_api: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub binary: PathBuf,
    /// Arguments placed before the config path.
    pub args: Vec<String>,
    /// Arguments placed after the config path.
    pub extra_args: Vec<String>,
    pub config_path: PathBuf,
    pub restart_delay: String,
    pub max_restart_delay: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// Directory holding one subdirectory per worker.
    pub dir: PathBuf,
    pub debounce: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            worker_id: "node-1".to_string(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            listen: "*:8080".to_string(),
            admin_api: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("workerd"),
            args: vec!["serve".to_string()],
            extra_args: vec!["--verbose".to_string()],
            config_path: PathBuf::from("/var/lib/workgrid/config.capnp"),
            restart_delay: "1s".to_string(),
            max_restart_delay: "30s".to_string(),
        }
    }
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/workgrid/workers"),
            debounce: "250ms".to_string(),
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        toml::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given and present, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> CoreResult<Self> {
        match path {
            Some(p) if p.is_file() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// Socket files owned by the runtime that must be removed between
    /// process generations.
    pub fn socket_paths(&self) -> Vec<PathBuf> {
        self.network
            .listen
            .strip_prefix("unix:")
            .map(|p| vec![PathBuf::from(p)])
            .unwrap_or_default()
    }

    pub fn restart_delay(&self) -> CoreResult<Duration> {
        parse_duration(&self.runtime.restart_delay)
    }

    pub fn max_restart_delay(&self) -> CoreResult<Duration> {
        parse_duration(&self.runtime.max_restart_delay)
    }

    pub fn debounce(&self) -> CoreResult<Duration> {
        parse_duration(&self.state.debounce)
    }
}

/// Parse a duration string like "5s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| CoreError::InvalidDuration(s.to_string()))
}
