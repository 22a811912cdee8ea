//! sacred-reader CLI
//!
//! Composition root: opens a results directory and hands the index to a
//! plain-text presentation.
//!
//! # Usage
//!
//! ```bash
//! # List all runs
//! sacred-reader results/
//!
//! # Show one run in detail
//! sacred-reader results/ --run 11
//!
//! # Export the run table
//! sacred-reader results/ --parquet runs.parquet
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use sacred_reader::experiment::RunIndex;
use tracing_subscriber::EnvFilter;

/// Inspect experiment result directories
#[derive(Parser, Debug)]
#[command(name = "sacred-reader", version, about)]
struct Cli {
    /// Results directory containing `_sources/` and numbered runs
    directory: PathBuf,

    /// Show details of a single run
    #[arg(long)]
    run: Option<String>,

    /// Write the run table to a Parquet file
    #[arg(long)]
    parquet: Option<PathBuf>,

    /// Only export runs whose key starts with this prefix
    #[arg(long)]
    filter_prefix: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut index = RunIndex::open(&cli.directory)
        .with_context(|| format!("failed to open {}", cli.directory.display()))?;
    println!("{index}");

    if let Some(key) = cli.run {
        let mut run = index.get(key.as_str())?;
        let info = run.info()?;
        println!("{run}");
        println!("  directory: {}", info.run_directory.display());
        println!("  started:   {}", info.start_time);
        match info.duration_secs() {
            Some(secs) => println!("  duration:  {secs}s"),
            None => println!("  duration:  (still running or crashed)"),
        }
        if let Ok(command) = run.command() {
            println!("  command:   {command}");
        }
        println!("  artifacts: {:?}", run.artifacts());
        if let Ok(names) = run.metric_names() {
            println!("  metrics:   {names:?}");
        }
        return Ok(());
    }

    let table = match &cli.filter_prefix {
        Some(prefix) => index.as_table_with(|keys| {
            keys.iter().filter(|k| k.starts_with(prefix.as_str())).cloned().collect()
        })?,
        None => index.as_table()?,
    };

    for row in table.rows() {
        println!(
            "{:>6}  {:<24} {:<12} {}",
            row.run_key,
            row.name.as_deref().unwrap_or("-"),
            row.status.as_deref().unwrap_or("-"),
            row.duration_secs().map_or_else(|| "-".to_string(), |s| format!("{s:.1}s")),
        );
    }

    if let Some(path) = cli.parquet {
        table
            .write_parquet(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {} runs to {}", table.len(), path.display());
    }
    Ok(())
}
