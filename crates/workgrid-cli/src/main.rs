use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::NodeArgs;

#[derive(Parser)]
#[command(
    name = "workgrid",
    about = "workgrid: run and inspect worker configurations locally",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the runtime on a worker directory and rebuild on every change.
    ///
    /// Any runtime crash ends the session with the runtime's exit code.
    Dev {
        #[command(flatten)]
        node: NodeArgs,
        /// Config output path (default: <dir>/.workgrid/config.capnp)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Override `runtime.binary`.
        #[arg(long)]
        runtime: Option<PathBuf>,
    },
    /// Compile a worker directory once.
    ///
    /// Without --out the config is printed; with --out the config and its
    /// artifacts are written.
    Render {
        #[command(flatten)]
        node: NodeArgs,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Load and compile every worker without writing anything.
    Check {
        #[command(flatten)]
        node: NodeArgs,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,workgrid=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Dev { node, out, runtime } => {
            let code = commands::dev::dev(&node, out, runtime).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Render { node, out } => commands::render::render(&node, out.as_deref()),
        Commands::Check { node } => commands::check::check(&node),
    }
}
