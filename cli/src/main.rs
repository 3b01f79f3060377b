//! Payment Channel Network Simulator CLI
//!
//! Generates a network and a payment workload from one seed, runs them
//! through the engine with the reference Dijkstra oracle, and writes
//! `group_events.csv` and `report.json` to the output directory.
//!
//! # Example
//!
//! ```bash
//! # Defaults: 50 nodes, 1000 payments, group routing
//! pcn-sim --seed 42 --output out/
//!
//! # A JSON config with command-line overrides
//! pcn-sim --config run.json --routing ideal --mpp
//! ```

use clap::{Parser, ValueEnum};
use pcn_simulator_core_rs::arrivals::{generate_payments, ArrivalError};
use pcn_simulator_core_rs::orchestrator::RoutingMethod;
use pcn_simulator_core_rs::topology::generate_network;
use pcn_simulator_core_rs::{
    DijkstraOracle, NetworkError, RngManager, Simulation, SimulationConfig, SimulationError,
};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum CliError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("config {path}: {source}")]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("network generation: {0}")]
    Topology(#[from] NetworkError),

    #[error("payment generation: {0}")]
    Arrivals(#[from] ArrivalError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Routing {
    Baseline,
    ChannelUpdate,
    GroupRouting,
    Ideal,
}

impl From<Routing> for RoutingMethod {
    fn from(routing: Routing) -> Self {
        match routing {
            Routing::Baseline => RoutingMethod::Baseline,
            Routing::ChannelUpdate => RoutingMethod::ChannelUpdate,
            Routing::GroupRouting => RoutingMethod::GroupRouting,
            Routing::Ideal => RoutingMethod::Ideal,
        }
    }
}

/// Payment channel network simulator
///
/// Deterministic: the same config and seed reproduce the same run.
#[derive(Parser, Debug)]
#[command(name = "pcn-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON simulation config; missing sections take their defaults
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Random seed (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Capacity estimate used for routing (overrides the config)
    #[arg(short = 'r', long, value_enum)]
    routing: Option<Routing>,

    /// Nodes attached to the generated seed ring
    #[arg(short = 'n', long)]
    nodes: Option<usize>,

    /// Number of generated payments
    #[arg(short = 'p', long)]
    payments: Option<usize>,

    /// Split unroutable payments in two
    #[arg(long)]
    mpp: bool,

    /// Directory receiving group_events.csv and report.json
    #[arg(short = 'o', long, default_value = ".")]
    output: PathBuf,
}

fn load_config(args: &Args) -> Result<SimulationConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(io_error(path))?;
            serde_json::from_str(&text).map_err(|source| CliError::Config {
                path: path.clone(),
                source,
            })?
        }
        None => SimulationConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.rng_seed = seed;
    }
    if let Some(routing) = args.routing {
        config.routing_method = routing.into();
    }
    if let Some(nodes) = args.nodes {
        config.topology.n_nodes = nodes;
    }
    if let Some(payments) = args.payments {
        config.payments.n_payments = payments;
    }
    if args.mpp {
        config.htlc.mpp = true;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<(), CliError> {
    let config = load_config(args)?;

    // Network and workload share one stream, seeded like the engine
    let mut rng = RngManager::new(config.rng_seed);
    let network = generate_network(&config.topology, &mut rng)?;
    let payments = generate_payments(&config.payments, network.num_nodes(), &mut rng)?;

    info!(
        seed = config.rng_seed,
        nodes = network.num_nodes(),
        channels = network.channels.len(),
        payments = payments.len(),
        routing = ?config.routing_method,
        "Starting simulation"
    );

    let oracle = DijkstraOracle::new(config.routing_method);
    let mut simulation = Simulation::new(config, network, payments, oracle)?;
    let report = simulation.run()?;

    fs::create_dir_all(&args.output).map_err(io_error(&args.output))?;

    let csv_path = args.output.join("group_events.csv");
    let file = File::create(&csv_path).map_err(io_error(&csv_path))?;
    let mut writer = BufWriter::new(file);
    simulation
        .group_manager()
        .log()
        .write_csv(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(io_error(&csv_path))?;

    let report_path = args.output.join("report.json");
    fs::write(&report_path, report.to_json()?).map_err(io_error(&report_path))?;

    println!(
        "{} payments: {} succeeded, {} failed, {} timed out ({:.1}% success, {:.2} attempts avg)",
        report.total_payments,
        report.succeeded,
        report.failed,
        report.timed_out,
        report.success_rate * 100.0,
        report.mean_attempts,
    );
    println!(
        "{} groups committed; end time {} ms; {} events",
        report.groups_committed, report.end_time, report.events_processed
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,pcn_simulator_core_rs=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {}", error);
            ExitCode::FAILURE
        }
    }
}
