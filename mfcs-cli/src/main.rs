use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod report;
mod suite;

#[derive(Parser)]
#[command(name = "mfcs", about = "Benchmark LLM function calling over the MFCS protocol")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every (model, test case) pair and write a report
    Run(commands::run::RunArgs),
    /// Load the suite and show the pairs a run would evaluate
    Check(commands::check::CheckArgs),
    /// Inspect configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Check(args) => commands::check::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
