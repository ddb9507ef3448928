//! nightshift CLI: the main entry point.
//!
//! Commands:
//! - `init`      Write a default config and create the state directory
//! - `run`       Start the autonomous worker (or run a single cycle)
//! - `stop`      Ask a running worker to shut down
//! - `status`    Show the last status written by a worker
//! - `queue`     Add manual requests or list the work queue
//! - `scan`      Check files for hard-coded credentials
//! - `gate`      Run the enforcement hook for a workflow phase
//! - `truncate`  Apply tool-output truncation to stdin or a file

use clap::{Parser, Subcommand};
use nightshift_config::AppConfig;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "nightshift",
    about = "nightshift: autonomous, approval-gated work queue runner",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, global = true, env = "NIGHTSHIFT_CONFIG", default_value = AppConfig::FILE_NAME)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the state directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Start the autonomous worker
    Run {
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,

        /// Ask on the terminal before running items that need confirmation
        #[arg(short, long)]
        interactive: bool,
    },

    /// Ask a running worker to stop after its current cycle
    Stop,

    /// Show worker status
    Status {
        /// Print the raw status JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the work queue
    Queue {
        #[command(subcommand)]
        action: commands::queue::QueueAction,
    },

    /// Scan files for hard-coded credentials
    Scan {
        /// Files to scan
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Run the enforcement gate for a workflow phase
    Gate {
        /// before-implementation, before-qa or before-refactor
        phase: String,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Truncate tool output the way it is fed back to the agent
    Truncate {
        /// Tool name (e.g. Bash, Read, Grep, LS)
        #[arg(short, long)]
        tool: String,

        /// Read from this file instead of stdin
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let load = || AppConfig::load(&cli.config).map_err(|e| format!("Failed to load config: {e}"));

    match cli.command {
        Commands::Init { force } => commands::init::run(&cli.config, force)?,
        Commands::Run { once, interactive } => commands::run::run(&load()?, once, interactive).await?,
        Commands::Stop => commands::stop::run(&load()?)?,
        Commands::Status { json } => commands::status::run(&load()?, json)?,
        Commands::Queue { action } => commands::queue::run(&load()?, action)?,
        Commands::Scan { files } => commands::scan::run(&load()?, &files)?,
        Commands::Gate { phase, dir } => commands::gate::run(&load()?, &phase, &dir).await?,
        Commands::Truncate { tool, file } => {
            commands::truncate::run(&load()?, &tool, file.as_deref())?
        }
    }

    Ok(())
}
