//! snowstorm-sim — drive a network of in-process consensus instances with
//! sampled votes and check that they agree.

mod network;
mod tx;

use anyhow::Context;
use clap::Parser;
use network::{Simulation, Workload};
use snowstorm_consensus::ConsensusConfig;
use snowstorm_utils::LogFormat;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "snowstorm-sim", about = "Snowstorm consensus network simulator")]
struct Cli {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// Defaults to the config file's value.
    #[arg(long, env = "SNOWSTORM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json". In json mode the final report is
    /// also printed as a single JSON line.
    #[arg(long, env = "SNOWSTORM_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Path to a TOML configuration file with consensus parameters.
    #[arg(long, env = "SNOWSTORM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run a simulation.
    Run {
        /// Number of simulated nodes.
        #[arg(long, default_value_t = 10)]
        nodes: usize,

        /// Give up after this many rounds.
        #[arg(long, default_value_t = 1000)]
        rounds: u64,

        /// Seed for peer sampling and first-seen order.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Two-member conflict sets per node.
        #[arg(long, default_value_t = 4)]
        conflict_sets: usize,

        /// Length of the dependency chain built on the first conflict set.
        #[arg(long, default_value_t = 3)]
        chain_length: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConsensusConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConsensusConfig::default(),
    };
    let log_format = cli.log_format.unwrap_or(config.log_format);
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    snowstorm_utils::init_logging(log_format, log_level);

    match cli.command {
        Command::Run {
            nodes,
            rounds,
            seed,
            conflict_sets,
            chain_length,
        } => {
            let params = &config.params;
            tracing::info!(
                nodes,
                seed,
                k = params.k,
                alpha = params.alpha,
                beta_virtuous = params.beta_virtuous,
                beta_rogue = params.beta_rogue,
                "starting simulation"
            );

            let workload = Workload {
                conflict_sets,
                chain_length,
            };
            let started = Instant::now();
            let mut sim = Simulation::new(nodes, params, &workload, seed)?;
            let report = sim.run(rounds)?;

            tracing::info!(
                rounds = report.rounds,
                finalized_nodes = report.finalized_nodes,
                accepted = report.accepted,
                rejected = report.rejected,
                undecided = report.undecided,
                elapsed = %snowstorm_utils::format_duration(started.elapsed()),
                "simulation finished"
            );
            if log_format == LogFormat::Json {
                println!("{}", serde_json::to_string(&report)?);
            }
            if report.undecided > 0 {
                tracing::warn!(
                    undecided = report.undecided,
                    "network did not settle within {rounds} rounds"
                );
            }
            if !report.is_consistent() {
                for id in &report.disagreements {
                    tracing::error!(tx = %id, "nodes disagree");
                }
                anyhow::bail!(
                    "{} transactions were accepted on some nodes and rejected on others",
                    report.disagreements.len()
                );
            }
        }
    }

    Ok(())
}
