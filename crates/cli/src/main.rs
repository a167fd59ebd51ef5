//! Secure memory simulator CLI.
//!
//! This binary drives the `cachet_core` model from the command line. It performs:
//! 1. **Run:** Loads a configuration, feeds a workload file or a generated pattern through
//!    the secure memory, and prints the requested statistics sections.
//! 2. **Config dump:** Prints the effective configuration as JSON, defaults included.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cachet_core::config::{Config, Scheme};
use cachet_core::sim::loader::{self, Pattern};
use cachet_core::sim::{RunSummary, Simulator};
use cachet_core::SecureMemory;

#[derive(Parser, Debug)]
#[command(
    name = "cachet",
    author,
    version,
    about = "Cycle-level secure memory controller model",
    long_about = "Run a workload through a counter-tree (CT) or Merkle-tree (MT) protected memory and print statistics.\n\nExamples:\n  cachet run --pattern sequential --count 10000\n  cachet run --config mt.json --workload trace.json --stats summary,metadata\n  cachet dump-config --scheme mt"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workload and print statistics.
    Run {
        /// JSON configuration file; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured scheme.
        #[arg(long, value_enum)]
        scheme: Option<SchemeArg>,

        /// JSON workload file (array of read/write operations).
        #[arg(short, long, conflicts_with = "pattern")]
        workload: Option<PathBuf>,

        /// Generate a workload instead of loading one.
        #[arg(short, long, value_enum, default_value = "sequential")]
        pattern: PatternArg,

        /// Operations to generate.
        #[arg(short = 'n', long, default_value_t = 10_000)]
        count: usize,

        /// Seed for generated workloads.
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Statistics sections to print (summary, controller, metadata, memory).
        #[arg(long, value_delimiter = ',')]
        stats: Vec<String>,

        /// Print the run summary as JSON instead of the statistics dump.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as JSON.
    DumpConfig {
        /// JSON configuration file to normalize; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured scheme.
        #[arg(long, value_enum)]
        scheme: Option<SchemeArg>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemeArg {
    Ct,
    Mt,
}

impl From<SchemeArg> for Scheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Ct => Self::Ct,
            SchemeArg::Mt => Self::Mt,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PatternArg {
    Sequential,
    Random,
    WriteThenRead,
}

impl From<PatternArg> for Pattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::Sequential => Self::Sequential,
            PatternArg::Random => Self::Random,
            PatternArg::WriteThenRead => Self::WriteThenRead,
        }
    }
}

#[derive(Serialize)]
struct Report {
    scheme: Scheme,
    cycles: u64,
    completed: usize,
    faults: usize,
    rejected: usize,
    avg_read_latency: f64,
    avg_write_latency: f64,
    meta_hit_rate: f64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = match cli.command {
        Commands::Run {
            config,
            scheme,
            workload,
            pattern,
            count,
            seed,
            stats,
            json,
        } => load_config(config.as_deref(), scheme).and_then(|config| {
            init_tracing(verbose, config.general.trace);
            let ops = match workload {
                Some(path) => loader::load_workload(&path).map_err(|e| e.to_string())?,
                None => loader::generate(
                    pattern.into(),
                    count,
                    config.layout.protected_bytes,
                    seed,
                ),
            };
            cmd_run(&config, &ops, &stats, json)
        }),
        Commands::DumpConfig { config, scheme } => {
            load_config(config.as_deref(), scheme).and_then(|config| {
                serde_json::to_string_pretty(&config)
                    .map(|text| println!("{text}"))
                    .map_err(|e| e.to_string())
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("[!] {message}");
            ExitCode::FAILURE
        }
    }
}

/// Installs the log subscriber; `RUST_LOG` wins over `--verbose` and `general.trace`.
fn init_tracing(verbose: bool, trace: bool) {
    let fallback = match (trace, verbose) {
        (true, _) => "warn,cachet_core=trace",
        (false, true) => "debug",
        (false, false) => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>, scheme: Option<SchemeArg>) -> Result<Config, String> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
            Config::from_json(&text).map_err(|e| e.to_string())?
        }
        None => Config::default(),
    };
    if let Some(scheme) = scheme {
        config.scheme = scheme.into();
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Builds the secure memory, drives the workload to completion and reports.
fn cmd_run(
    config: &Config,
    ops: &[loader::WorkloadOp],
    sections: &[String],
    json: bool,
) -> Result<(), String> {
    let memory = SecureMemory::new(config).map_err(|e| e.to_string())?;
    info!(
        scheme = %config.scheme,
        ops = ops.len(),
        protected_bytes = config.layout.protected_bytes,
        "starting run"
    );

    let mut sim = Simulator::new(memory, ops, config.general.max_cycles);
    let summary: RunSummary = sim.run().map_err(|e| e.to_string())?;
    let stats = sim.memory().stats();

    if json {
        let report = Report {
            scheme: config.scheme,
            cycles: summary.cycles,
            completed: summary.completed,
            faults: summary.faults,
            rejected: summary.rejected,
            avg_read_latency: stats.avg_read_latency(),
            avg_write_latency: stats.avg_write_latency(),
            meta_hit_rate: stats.meta_hit_rate(),
        };
        let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        println!(
            "[*] {} run: {} responses, {} faults, {} rejected in {} cycles",
            config.scheme, summary.completed, summary.faults, summary.rejected, summary.cycles
        );
        stats.print_sections(sections);
    }
    Ok(())
}
