//! Large Worlds CLI
//!
//! Runs a market experiment described by a `name:value` input file and
//! writes the results to `<file_name>.db` for post-hoc analysis.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use largeworlds::config::SimConfig;
use largeworlds::engine::LargeWorld;
use largeworlds::persistence::sqlite::SqliteSink;

#[derive(Parser, Debug)]
#[command(name = "largeworlds")]
#[command(about = "Agent-based large-world securities market simulation")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the simulation described by an input file
    Run {
        input_file: PathBuf,

        /// Override the seed from the input file
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "largeworlds=info".into()),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Run { input_file, seed } => run(&input_file, seed),
    }
}

fn run(input_file: &Path, seed: Option<u64>) -> Result<()> {
    let started = chrono::Utc::now();

    let mut config = SimConfig::from_input_file(input_file)?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    info!("inputs:\n{}", serde_json::to_string_pretty(&config)?);

    let db_path = PathBuf::from(format!("{}.db", config.file_name));
    let sink = SqliteSink::create(&db_path)?;
    let mut world = LargeWorld::new(config, sink)?;
    world.simulate()?;

    let elapsed = chrono::Utc::now() - started;
    info!(
        "done in {} ms, results in {}",
        elapsed.num_milliseconds(),
        db_path.display()
    );
    Ok(())
}
