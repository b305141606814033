use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "flowctl",
    about = "FlowGrid — metric-driven traffic weights for GPU backends",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to flowgrid.toml
    #[arg(short, long, global = true, default_value = "flowgrid.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass and apply the weights.
    Run {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Compute weights and the patch without applying them.
    Plan {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Run passes periodically until interrupted.
    Watch {
        /// Override [controller].interval, e.g. "30s" or "2m".
        #[arg(short, long)]
        interval: Option<String>,
    },
    /// Write a scaffolded flowgrid.toml.
    Init {
        /// Output path (default: the --config path)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,flowctl=debug,flowgrid=debug".parse().unwrap());
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    match cli.command {
        Commands::Run { format } => commands::pass::run(&cli.config, format).await,
        Commands::Plan { format } => commands::pass::plan(&cli.config, format).await,
        Commands::Watch { interval } => commands::watch::watch(&cli.config, interval.as_deref()).await,
        Commands::Init { output, force } => {
            commands::init::init(output.as_deref().unwrap_or(&cli.config), force)
        }
    }
}
