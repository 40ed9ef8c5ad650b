//! Delve CLI — terminal front end for the delve research pipeline.
//!
//! Runs one research session per invocation, or inspects configuration and
//! past sessions through subcommands.

mod commands;
mod progress;
mod research;
mod selector;

use clap::Parser;
use delve_core::config::DelveConfig;
use std::path::PathBuf;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Delve: turn a vague topic into a researched report
#[derive(Parser, Debug)]
#[command(name = "delve", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Research topic (prompted for if omitted)
    topic: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace directory (searched for .delve/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Directory for run artifacts and session records
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Non-interactive: keep the original topic
    #[arg(short, long)]
    yes: bool,

    /// Use this model for every stage
    #[arg(short, long)]
    model: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Emit logs as JSON on stderr
    #[arg(long)]
    json_logs: bool,

    /// Also write JSON logs to this file, rotated daily
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Fold command-line overrides into the loaded configuration.
    fn apply(&self, config: &mut DelveConfig) {
        if let Some(model) = &self.model {
            config.set_model_for_all(model);
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
    }

    fn log_level(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List saved research sessions
    Sessions {
        /// Number of sessions to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file to the workspace
    Init,
}

/// Install the stderr subscriber and, when asked, a daily-rolling JSON file.
///
/// `RUST_LOG` takes precedence over the verbosity flags.
fn init_tracing(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let level = cli.log_level();
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,reqwest=warn")))
    };

    let stderr_layer = if cli.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed()
    };

    let (file_layer, guard) = match &cli.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "delve.log".to_string());
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug,hyper=warn,reqwest=warn"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(&cli)?;

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config =
        delve_core::config::load_config(Some(&workspace), cli.config.as_deref(), None)
            .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
    cli.apply(&mut config);
    for warning in config.validate() {
        warn!("{warning}");
    }

    match cli.command {
        Some(command) => commands::handle_command(command, &config, &workspace).await,
        None => {
            let options = research::RunOptions {
                topic: cli.topic,
                interactive: !cli.yes,
                quiet: cli.quiet,
            };
            research::run(options, config).await
        }
    }
}
