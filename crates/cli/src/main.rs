//! Coherence directory trace runner.
//!
//! This binary wires a single directory between a trace-driven cache model
//! and the functional backing memory, then clocks it until the trace drains.
//! It performs:
//! 1. **Setup:** Load the JSON configuration (or defaults) and the request trace.
//! 2. **Run:** Tick the directory until it, the caches and memory are all idle.
//! 3. **Report:** Print a summary and, on request, the statistics sections or a state dump.

mod caches;
mod trace;

use std::io::{self, Write};
use std::{fs, process};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dirsim_core::memory::{BackingMemory, MemoryPort};
use dirsim_core::{Config, DirectoryController, DirectoryError};

use crate::caches::{CacheModel, CachePort};
use crate::trace::{Trace, TraceError};

#[derive(Parser, Debug)]
#[command(
    name = "dirsim",
    author,
    version,
    about = "Cycle-level MESI/MSI coherence directory",
    long_about = "Replay a request trace against a coherence directory.\n\nCaches in the trace answer invalidations and fetches reflexively; memory is modelled with a fixed-latency or DRAM controller.\n\nExamples:\n  dirsim run --trace demos/sharing.json\n  dirsim run --trace demos/sharing.json --config demos/msi.json --stats\n  RUST_LOG=dirsim_core=debug dirsim run --trace demos/sharing.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a trace.
    Run {
        /// JSON trace of cache requests.
        #[arg(short, long)]
        trace: String,

        /// JSON configuration; built-in defaults when absent.
        #[arg(short, long)]
        config: Option<String>,

        /// Stop after this many cycles even if work remains.
        #[arg(long, default_value_t = 1_000_000)]
        max_cycles: u64,

        /// Print every statistics section.
        #[arg(long)]
        stats: bool,

        /// Print only these statistics sections (summary, requests, responses, memory, structures).
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,

        /// Dump the directory state when the run ends.
        #[arg(long)]
        dump: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            trace,
            config,
            max_cycles,
            stats,
            sections,
            dump,
        } => cmd_run(&trace, config.as_deref(), max_cycles, stats, &sections, dump),
    }
}

/// Failure that ends a run.
#[derive(Debug, Error)]
enum RunError {
    /// The configuration file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        /// Config path.
        path: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The trace could not be loaded.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// Invalid configuration or a protocol error during the run.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Loads the configuration file, or the defaults when none is given.
fn load_config(path: Option<&str>) -> Result<Config, RunError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path).map_err(|source| RunError::ConfigIo {
        path: path.to_owned(),
        source,
    })?;
    Ok(Config::from_json(&text)?)
}

/// A directory after a run, with the cache model it served.
struct Run {
    dir: DirectoryController,
    caches: CachePort,
    finished: bool,
}

/// Ticks a directory over `trace` until it, the caches and memory are idle.
///
/// Stops early after `max_cycles` with `finished` unset.
///
/// # Errors
///
/// Returns the first protocol error, after dumping the directory state to stderr.
fn run(config: &Config, trace: Trace, max_cycles: u64) -> Result<Run, RunError> {
    let memory = MemoryPort::new(BackingMemory::new("memory", config));
    let caches = CachePort::new(CacheModel::new(
        trace,
        &config.directory.name,
        memory.lock().name(),
        config.directory.line_size,
    ));
    let mut dir = DirectoryController::new(
        config.directory.clone(),
        Box::new(caches.clone()),
        Some(Box::new(memory.clone())),
    )?;

    info!(
        protocol = ?config.directory.protocol,
        sources = dir.sources().len(),
        "starting run"
    );

    let mut finished = false;
    while dir.timestamp() < max_cycles {
        match dir.tick() {
            Ok(idle) => {
                if idle && caches.lock().is_idle() && memory.lock().is_idle() {
                    finished = true;
                    break;
                }
            }
            Err(e) => {
                error!(cycle = dir.timestamp(), "{e}");
                dir.emergency_shutdown();
                dir.stats().print();
                return Err(e.into());
            }
        }
    }
    if !finished {
        warn!(max_cycles, "cycle limit reached with work outstanding");
    }
    Ok(Run { dir, caches, finished })
}

/// Runs a trace and reports the outcome.
///
/// Exits with code 1 on a load or protocol error and with code 2 when
/// `max_cycles` is reached with work remaining.
fn cmd_run(
    trace_path: &str,
    config_path: Option<&str>,
    max_cycles: u64,
    stats: bool,
    sections: &[String],
    dump: bool,
) {
    let outcome = load_config(config_path).and_then(|config| {
        let trace = Trace::load(trace_path)?;
        run(&config, trace, max_cycles)
    });
    let Run { dir, caches, finished } = outcome.unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    {
        let model = caches.lock();
        println!(
            "[*] {} after {} cycles: {} issued, {} completed, {} answered, {} retried",
            if finished { "Drained" } else { "Stopped" },
            dir.timestamp(),
            model.issued,
            model.completed,
            model.answered,
            model.retried
        );
    }
    if stats {
        dir.stats().print();
    } else if !sections.is_empty() {
        dir.stats().print_sections(sections);
    }
    if dump {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = dir.print_status(&mut out) {
            eprintln!("Error writing status: {e}");
        }
        let model = caches.lock();
        for cache in dir.sources() {
            let held: Vec<String> = model.held_by(cache).iter().map(|a| format!("{a:#x}")).collect();
            let _ = writeln!(out, "cache {cache} holds [{}]", held.join(", "));
        }
    }
    let _ = io::stdout().flush();

    if !finished {
        process::exit(2);
    }
}
