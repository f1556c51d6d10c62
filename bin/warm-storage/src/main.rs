//! Warm Storage Operator Binary
//!
//! Offline tooling for operators of the warm storage service: validate a
//! configuration, print a proving schedule, and inspect or dry-run
//! arbitration against a persisted state snapshot.
//!
//! Usage:
//!   warm-storage config check --config service.toml
//!   warm-storage schedule --config service.toml --activation 1000 --periods 4
//!   warm-storage inspect --snapshot state.json --data-set 1 --epoch 3825
//!   warm-storage arbitrate --snapshot state.json --rail 1 --amount 5760 --from 1000 --to 6760 --epoch 9000

#![allow(missing_docs)]

mod arbitrate;
mod config;
mod inspect;
mod schedule;
mod snapshot;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Warm storage operator tooling
#[derive(Debug, Parser)]
#[command(name = "warm-storage", version, about = "Warm storage service operator tooling")]
struct Cli {
    /// Log filter directives, e.g. `warm_storage=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Configuration utilities
    #[command(subcommand)]
    Config(config::ConfigCommand),
    /// Print the proving schedule for an activation epoch
    Schedule(schedule::ScheduleArgs),
    /// Show a data set from a state snapshot
    Inspect(inspect::InspectArgs),
    /// Dry-run settlement arbitration against a state snapshot
    Arbitrate(arbitrate::ArbitrateArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log)?)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| eyre::eyre!(err))?;

    match cli.command {
        Commands::Config(command) => command.run(),
        Commands::Schedule(args) => args.run(),
        Commands::Inspect(args) => args.run(),
        Commands::Arbitrate(args) => args.run(),
    }
}
