//! Reload driver: turns desired state into a running runtime generation.
//!
//! Each reload builds a fresh [`Configurator`], adds every desired worker,
//! writes config and artifacts, then restarts the runtime on the new
//! config. Reloads are serialized through one gate; a trigger that fires
//! mid-reload waits for the current one to finish.

use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use workgrid_config::{Configurator, Entropy};
use workgrid_core::Settings;
use workgrid_supervisor::Supervisor;

use crate::error::ReloadResult;
use crate::state::DesiredState;
use crate::trigger::{ReloadCause, ReloadTrigger};

/// Everything a reload needs besides the supervisor.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub worker_id: String,
    pub listen: String,
    pub admin_api: String,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    /// Socket files removed between runtime generations.
    pub sockets: Vec<PathBuf>,
    /// Seed for generated names. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl DriverConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            worker_id: settings.node.worker_id.clone(),
            listen: settings.network.listen.clone(),
            admin_api: settings.network.admin_api.clone(),
            state_dir: settings.state.dir.clone(),
            config_path: settings.runtime.config_path.clone(),
            sockets: settings.socket_paths(),
            seed: None,
        }
    }

    fn entropy(&self) -> Entropy {
        match self.seed {
            Some(seed) => Entropy::seeded(seed),
            None => Entropy::Os,
        }
    }
}

/// Result of one successful reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Identifiers assigned to the workers, in load order.
    pub identifiers: Vec<String>,
    pub config_path: PathBuf,
}

/// Build a configuration generation for `state` without writing it.
pub fn compile(
    config: &DriverConfig,
    state: &DesiredState,
) -> ReloadResult<(Configurator, Vec<String>)> {
    let mut configurator =
        Configurator::with_entropy(&config.worker_id, &config.listen, &config.admin_api, config.entropy())?;
    let mut identifiers = Vec::with_capacity(state.len());
    for spec in state.specs() {
        identifiers.push(configurator.add_worker(spec)?);
    }
    Ok((configurator, identifiers))
}

pub struct ReloadDriver {
    config: DriverConfig,
    supervisor: Supervisor,
    gate: Mutex<()>,
}

impl ReloadDriver {
    pub fn new(config: DriverConfig, supervisor: Supervisor) -> Self {
        Self {
            config,
            supervisor,
            gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Load desired state, write a new generation and restart the runtime
    /// on it. Any failure before the restart leaves the running runtime
    /// and the previous config untouched.
    pub async fn reload_once(&self) -> ReloadResult<ReloadOutcome> {
        let _gate = self.gate.lock().await;
        let started = Instant::now();

        let state = DesiredState::load(&self.config.state_dir)?;
        let (configurator, identifiers) = compile(&self.config, &state)?;
        configurator.write_config(&self.config.config_path)?;

        self.supervisor
            .restart(&self.config.config_path, &self.config.sockets)
            .await?;

        info!(
            workers = identifiers.len(),
            config = %self.config.config_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reload complete"
        );
        Ok(ReloadOutcome {
            identifiers,
            config_path: self.config.config_path.clone(),
        })
    }

    /// Reload on every trigger until the trigger ends or `shutdown` flips.
    /// Failed reloads are logged; the loop keeps going.
    pub async fn run<T: ReloadTrigger>(&self, mut trigger: T, mut shutdown: watch::Receiver<bool>) {
        info!(state_dir = %self.config.state_dir.display(), "reload driver running");
        loop {
            tokio::select! {
                cause = trigger.next() => {
                    let Some(cause) = cause else {
                        warn!("reload trigger closed");
                        break;
                    };
                    log_cause(cause);
                    if let Err(e) = self.reload_once().await {
                        error!(error = %e, "reload failed; keeping current generation");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reload driver shutting down");
                    break;
                }
            }
        }
    }
}

fn log_cause(cause: ReloadCause) {
    match cause {
        ReloadCause::Filesystem { events } => info!(events, "state changed; reloading"),
        ReloadCause::Manual => info!("reload requested"),
    }
}
