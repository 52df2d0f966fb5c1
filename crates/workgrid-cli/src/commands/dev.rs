//! `workgrid dev`: local development loop.
//!
//! Builds the worker directory, runs the runtime on it, and rebuilds on
//! every change. The runtime is supervised fail-fast: if it dies the
//! session ends with its exit code. A broken manifest during the session
//! only logs; the last good generation keeps running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use workgrid_core::Settings;
use workgrid_reload::{FsWatchTrigger, ReloadDriver};
use workgrid_supervisor::{ExitPolicy, RuntimeCommand, Supervisor, SupervisorOptions};

use super::NodeArgs;

/// Output directory under the worker directory when `--out` is not given.
pub const DEV_OUT_DIR: &str = ".workgrid";

/// Run the dev loop. Returns the exit code the process should end with.
pub async fn dev(node: &NodeArgs, out: Option<PathBuf>, runtime: Option<PathBuf>) -> Result<i32> {
    let mut settings = node.settings()?;
    if let Some(binary) = runtime {
        settings.runtime.binary = binary;
    }
    let config_path = out.unwrap_or_else(|| default_config_path(&node.dir));
    let out_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let supervisor = Supervisor::new(runtime_command(&settings), supervisor_options(&settings)?);
    let driver = Arc::new(ReloadDriver::new(
        node.driver_config(&settings, &config_path),
        supervisor.clone(),
    ));

    let trigger = FsWatchTrigger::new(&node.dir, settings.debounce()?)
        .context("watching worker directory")?
        .ignore(&out_dir);

    let outcome = driver.reload_once().await.context("initial build failed")?;
    info!(
        workers = outcome.identifiers.len(),
        config = %outcome.config_path.display(),
        listen = %settings.network.listen,
        "dev session started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reload_handle = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.run(trigger, shutdown_rx).await })
    };

    let mut fatal = supervisor.fatal();
    let code = tokio::select! {
        code = fatal.wait_for(Option::is_some) => {
            let code = code.ok().and_then(|c| *c).unwrap_or(1);
            warn!(code, "runtime exited; ending dev session");
            code
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to install CTRL+C handler")?;
            info!("interrupted");
            0
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = reload_handle.await;
    supervisor.stop(&settings.socket_paths()).await?;
    Ok(code)
}

fn default_config_path(dir: &Path) -> PathBuf {
    dir.join(DEV_OUT_DIR).join("config.capnp")
}

fn runtime_command(settings: &Settings) -> RuntimeCommand {
    RuntimeCommand::new(settings.runtime.binary.display().to_string())
        .with_args(settings.runtime.args.clone())
        .with_extra_args(settings.runtime.extra_args.clone())
}

fn supervisor_options(settings: &Settings) -> Result<SupervisorOptions> {
    Ok(SupervisorOptions::new(ExitPolicy::FailFast)
        .with_restart_delay(settings.restart_delay()?, settings.max_restart_delay()?))
}
