//! Gremlin CLI: run one upstream chaos experiment against a service mesh.
//!
//! Without a subcommand the full experiment runs with the configured target
//! selection policy.

mod commands;
mod report;

use clap::Parser;
use gremlin_core::config::ConfigOverrides;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Gremlin: measure how a fault in one service ripples upstream
#[derive(Parser, Debug)]
#[command(name = "gremlin", version, about, long_about = None)]
struct Cli {
    /// Trace-query service endpoint (overrides config)
    #[arg(long, global = true)]
    jaeger: Option<String>,

    /// Fault-injection service endpoint (overrides config)
    #[arg(long, global = true)]
    fault: Option<String>,

    /// Workspace directory (holds the CSV data and .gremlin/config.toml)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the experiment (default)
    Run {
        /// Inject into this service instead of selecting one
        #[arg(short, long)]
        target: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve the upstream set without touching the trace or fault services
    Upstream {
        /// Service to resolve (defaults to the selection policy's pick)
        target: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "gremlin", "gremlin")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "gremlin.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let overrides = ConfigOverrides {
        trace_endpoint: cli.jaeger,
        fault_endpoint: cli.fault,
    };
    let command = cli.command.unwrap_or(Commands::Run {
        target: None,
        json: false,
    });

    commands::handle_command(command, &workspace, cli.config.as_deref(), &overrides).await
}
