//! workgridd: the workgrid node daemon.
//!
//! Watches the state directory, regenerates the runtime config on every
//! change and keeps the runtime alive: crashes are restarted with
//! backoff rather than taking the daemon down.
//!
//! # Usage
//!
//! ```text
//! workgridd serve --config /etc/workgrid/workgrid.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use workgrid_core::Settings;
use workgrid_reload::{DriverConfig, FsWatchTrigger, ReloadDriver};
use workgrid_supervisor::{ExitPolicy, RuntimeCommand, Supervisor, SupervisorOptions};

#[derive(Parser)]
#[command(name = "workgridd", about = "workgrid node daemon", version)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the workers in the state directory until interrupted.
    Serve {
        /// Node settings file.
        #[arg(short, long, default_value = "/etc/workgrid/workgrid.toml")]
        config: PathBuf,

        /// Override `state.dir`.
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Override `network.listen`.
        #[arg(long)]
        listen: Option<String>,

        /// Override `runtime.binary`.
        #[arg(long)]
        runtime: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve {
            config,
            state_dir,
            listen,
            runtime,
        } => {
            let mut settings = Settings::load_or_default(Some(&config))
                .with_context(|| format!("loading {}", config.display()))?;
            apply_overrides(&mut settings, state_dir, listen, runtime);
            serve(settings).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,workgridd=debug,workgrid=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

fn apply_overrides(
    settings: &mut Settings,
    state_dir: Option<PathBuf>,
    listen: Option<String>,
    runtime: Option<PathBuf>,
) {
    if let Some(dir) = state_dir {
        settings.state.dir = dir;
    }
    if let Some(listen) = listen {
        settings.network.listen = listen;
    }
    if let Some(binary) = runtime {
        settings.runtime.binary = binary;
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    info!(
        worker_id = %settings.node.worker_id,
        state_dir = %settings.state.dir.display(),
        "workgridd starting"
    );

    // ── Supervisor ─────────────────────────────────────────────

    let command = RuntimeCommand::new(settings.runtime.binary.display().to_string())
        .with_args(settings.runtime.args.clone())
        .with_extra_args(settings.runtime.extra_args.clone());
    let options = SupervisorOptions::new(ExitPolicy::SelfHealing)
        .with_restart_delay(settings.restart_delay()?, settings.max_restart_delay()?);
    let supervisor = Supervisor::new(command, options);

    // ── Reload driver ──────────────────────────────────────────

    let driver = Arc::new(ReloadDriver::new(
        DriverConfig::from_settings(&settings),
        supervisor.clone(),
    ));

    // Watch before the first build so edits made during it are not lost.
    let trigger = FsWatchTrigger::new(&settings.state.dir, settings.debounce()?)
        .context("watching state directory")?;

    // A broken initial state is not fatal; the next change retries.
    if let Err(e) = driver.reload_once().await {
        error!(error = %e, "initial reload failed; waiting for changes");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reload_handle = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.run(trigger, shutdown_rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = reload_handle.await;

    supervisor.stop(&settings.socket_paths()).await?;
    info!("workgridd stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = Settings::default();
        apply_overrides(
            &mut settings,
            Some(PathBuf::from("/srv/workers")),
            Some("unix:/run/workgrid/http.sock".to_string()),
            None,
        );
        assert_eq!(settings.state.dir, PathBuf::from("/srv/workers"));
        assert_eq!(settings.socket_paths(), vec![PathBuf::from("/run/workgrid/http.sock")]);
        assert_eq!(settings.runtime.binary, PathBuf::from("workerd"));
    }

    #[test]
    fn cli_parses_serve() {
        let cli = Cli::try_parse_from(["workgridd", "--log-format", "json", "serve", "--listen", "*:9000"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        let Command::Serve { listen, config, .. } = cli.command;
        assert_eq!(listen.as_deref(), Some("*:9000"));
        assert_eq!(config, PathBuf::from("/etc/workgrid/workgrid.toml"));
    }
}
