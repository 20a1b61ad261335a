//! worker-dispatch
//!
//! Sticky, risk-aware dispatch of connections to a fixed worker pool.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!   connection event    │  dispatch::StickyDispatcher                  │
//!   (fd, kind, bytes)   │                                              │
//!  ────────────────────▶│  affinity table ── hit ──▶ pinned worker     │
//!                       │        │                                     │
//!                       │       miss                                   │
//!                       │        ▼                                     │
//!                       │  ResolveWorker (risk_partitioned | rr)       │
//!                       │        │  request head ─▶ classify::rules    │
//!                       │        ▼                                     │
//!                       │  workers::WorkerStatusOracle (idle/busy)     │
//!                       └────────┬─────────────────────────────────────┘
//!                                ▼
//!                          worker index
//! ```
//!
//! # Commands
//! - `simulate`: replay generated traffic against a simulated pool and print a JSON report
//! - `check`: validate a config file and show the partition layout
//! - `classify`: show whether a request line is treated as risky

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use worker_dispatch::classify::{RiskClassifier, RuleClassifier};
use worker_dispatch::config::{load_config, ConfigWatcher, DispatchConfig, StrategyKind};
use worker_dispatch::dispatch::{build_dispatcher, PartitionBoundary};
use worker_dispatch::lifecycle::{signals, Shutdown};
use worker_dispatch::observability::{logging, metrics};
use worker_dispatch::simulation::Simulation;
use worker_dispatch::workers::SimulatedPool;

#[derive(Parser)]
#[command(name = "worker-dispatch")]
#[command(about = "Sticky, risk-aware connection dispatch", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a traffic simulation and print the report as JSON
    Simulate {
        /// Configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override `workers.count`
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        workers: Option<u32>,

        /// Override `dispatcher.strategy` (risk_partitioned, round_robin)
        #[arg(short, long)]
        strategy: Option<StrategyKind>,

        /// Override `simulation.connections`
        #[arg(long)]
        connections: Option<usize>,
    },
    /// Validate a configuration file and print the effective settings
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Classify a request line with the configured risk rules
    Classify {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Request line, e.g. "GET /export HTTP/1.1"
        request_line: String,

        /// Host header value
        #[arg(long, default_value = "")]
        host: String,
    },
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct Overrides {
    workers: Option<u32>,
    strategy: Option<StrategyKind>,
    connections: Option<usize>,
}

impl Overrides {
    fn apply(&self, config: &mut DispatchConfig) {
        if let Some(workers) = self.workers {
            config.workers.count = workers as usize;
        }
        if let Some(strategy) = self.strategy {
            config.dispatcher.strategy = strategy;
        }
        if let Some(connections) = self.connections {
            config.simulation.connections = connections;
        }
    }
}

fn load(path: Option<&Path>) -> Result<DispatchConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(DispatchConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            workers,
            strategy,
            connections,
        } => {
            let from_file = load(config.as_deref())?;
            let mut settings = from_file.clone();
            Overrides {
                workers,
                strategy,
                connections,
            }
            .apply(&mut settings);
            simulate(settings, config.map(|path| (path, from_file))).await?;
        }
        Commands::Check { config } => {
            let settings = load(config.as_deref())?;
            let layout = PartitionBoundary::compute(
                settings.workers.count,
                settings.dispatcher.risky_workers_percent,
            );

            println!("{}", toml::to_string_pretty(&settings)?);
            println!(
                "# partitions: safe workers {:?}, risky workers {:?}",
                layout.safe_range(),
                layout.risky_range()
            );
        }
        Commands::Classify {
            config,
            request_line,
            host,
        } => {
            let settings = load(config.as_deref())?;
            let classifier = RuleClassifier::new(&settings.classifier);
            let layout = PartitionBoundary::compute(
                settings.workers.count,
                settings.dispatcher.risky_workers_percent,
            );

            if classifier.is_risky(&request_line, &host) {
                println!("risky: served by workers {:?}", layout.risky_range());
            } else {
                println!("safe: any idle worker, busy fallback {:?}", layout.safe_range());
            }
        }
    }

    Ok(())
}

/// Run the simulation. `watched` is the config file with the settings it held
/// at startup, before command-line overrides.
async fn simulate(
    config: DispatchConfig,
    watched: Option<(PathBuf, DispatchConfig)>,
) -> Result<(), Box<dyn Error>> {
    logging::init_logging(&config.observability)?;
    tracing::info!("worker-dispatch v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let classifier = RuleClassifier::new(&config.classifier);
    let dispatcher = build_dispatcher(&config.dispatcher, classifier.clone())?;
    let pool = Arc::new(SimulatedPool::new(config.workers.count));
    let layout = PartitionBoundary::compute(
        config.workers.count,
        config.dispatcher.risky_workers_percent,
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    // Rules reload live; everything else is fixed for the run
    let _watch = match watched {
        Some((path, from_file)) => {
            let (watcher, mut updates) = ConfigWatcher::new(&path);
            let handle = watcher.run()?;
            tokio::spawn(async move {
                while let Some(update) = updates.recv().await {
                    classifier.reload(&update.classifier);
                    if from_file.requires_restart(&update) {
                        tracing::warn!(
                            "Dispatcher and worker settings changed, restart to apply them"
                        );
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    let simulation = Simulation::new(dispatcher, pool, config.dispatcher.strategy, layout);
    let report = simulation.run(&config.simulation, shutdown).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    tracing::info!("Shutdown complete");
    Ok(())
}
