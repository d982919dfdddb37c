//! remedian CLI — the main entry point.
//!
//! Commands:
//! - `run`    — Execute one agent run (alert-driven or with an explicit task)
//! - `config` — Print the default configuration TOML

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod alerts;
mod commands;
mod prompts;
mod scenario;

#[derive(Parser)]
#[command(
    name = "remedian",
    about = "remedian — autonomous LLM remediation agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one agent run
    Run {
        /// Run with an explicit task instead of building one from firing alerts
        #[arg(short, long)]
        task: Option<String>,

        /// Path to the configuration file
        #[arg(short, long, default_value = "remedian.toml")]
        config: PathBuf,

        /// Path to the scenario data file (kubeconfig, alert source)
        #[arg(short, long)]
        scenario: Option<PathBuf>,
    },

    /// Print the default configuration TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            task,
            config,
            scenario,
        } => commands::run::run(task, config, scenario).await?,
        Commands::Config => commands::config_cmd::run()?,
    }

    Ok(())
}
