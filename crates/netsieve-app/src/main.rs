//! Netsieve - inspect, export, and replay filter object logs.
//!
//! The filter engine appends every object it sees to a binary log. This
//! binary reads such a log back:
//! - `dump` lists records with their summaries
//! - `show` prints one record's streams
//! - `export` writes one record's streams to a `.bin` file
//! - `replay` runs every record through the filter engine with ad hoc parameters

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netsieve_storage::FileBackend;
use tracing_subscriber::EnvFilter;

mod commands;

/// Netsieve - protocol content filter log tools
#[derive(Parser, Debug)]
#[command(name = "netsieve", version, about)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every record in a log
    Dump {
        /// Log file (defaults to the per-user data directory)
        log: Option<PathBuf>,

        /// Print one JSON object per record
        #[arg(long)]
        json: bool,
    },

    /// Print the streams of one record as text
    Show {
        log: Option<PathBuf>,

        /// Record offset as printed by `dump`
        #[arg(long)]
        offset: u64,
    },

    /// Write the streams of one record to a .bin file
    Export {
        log: Option<PathBuf>,

        #[arg(long)]
        offset: u64,

        /// Output directory
        #[arg(long)]
        out: PathBuf,
    },

    /// Re-run every record through the filter with the given parameters
    Replay {
        log: Option<PathBuf>,

        /// Filter parameter as key=value (repeatable), e.g. html-stop-word=casino
        #[arg(long = "set", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Write the replayed objects to a new log
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Initialize console logging.
fn init_logging(args: &Args) {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("netsieve={},warn", log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_log(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => FileBackend::default_path().context("Could not determine app data directory"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    tracing::debug!("Running {:?}", args.command);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Dump { log, json } => commands::dump(&resolve_log(log)?, json, &mut out),
        Command::Show { log, offset } => commands::show(&resolve_log(log)?, offset, &mut out),
        Command::Export {
            log,
            offset,
            out: dir,
        } => {
            let path = commands::export(&resolve_log(log)?, offset, &dir)?;
            writeln!(out, "{}", path.display())?;
            Ok(())
        }
        Command::Replay { log, params, out: dest } => {
            let config = commands::parse_params(&params)?;
            commands::replay(&resolve_log(log)?, config, dest.as_deref(), &mut out)
        }
    }
}
