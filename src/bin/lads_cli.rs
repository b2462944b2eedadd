use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use lads::clock::ManualClock;
use lads::config::Config;
use lads::input::read_log_file;
use lads::output::{OutputFormat, VerdictWriter};
use lads::pipeline::Pipeline;
use lads::store::MemoryEventStore;

/// Login Anomaly Detection System command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "lads", about = "Login anomaly detection CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Run an offline batch scan over an existing login log
    Scan {
        /// Path to the CSV login log
        #[structopt(short, long)]
        file: PathBuf,
        /// Path to configuration file (defaults are used if missing)
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Only print anomalous verdicts
        #[structopt(long)]
        anomalies_only: bool,
    },
    /// Validate a configuration file
    Check {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Check { config } => {
            if !config.exists() {
                eprintln!("Configuration file not found: {:?}", config);
                eprintln!("Run 'lads config' to generate a default configuration");
                std::process::exit(1);
            }
            let loaded = Config::from_file(&config)?;
            println!(
                "Configuration OK: window={}s, {} trees, retrain every {} windows",
                loaded.engine.window_size_seconds,
                loaded.engine.model.n_trees,
                loaded.engine.model.retrain_interval_windows
            );
        }
        Cli::Scan {
            file,
            config,
            anomalies_only,
        } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }
            let config = if config.exists() {
                Config::from_file(&config)?
            } else {
                Config::default()
            };
            scan(&file, &config, anomalies_only)?;
        }
    }

    Ok(())
}

/// Replay a whole log through the engine: ingest every row, advance a
/// manual clock past the last event and close everything in one pass.
fn scan(
    file: &PathBuf,
    config: &Config,
    anomalies_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (events, skipped) = read_log_file(file)?;
    if events.is_empty() {
        println!("No parseable events in {:?} ({} lines skipped)", file, skipped);
        return Ok(());
    }

    let first = events.iter().map(|e| e.timestamp).min().expect("non-empty");
    let last = events.iter().map(|e| e.timestamp).max().expect("non-empty");

    let clock = Arc::new(ManualClock::new(first));
    let pipeline = Pipeline::new(
        &config.engine,
        Arc::new(MemoryEventStore::new()),
        clock.clone(),
    );

    let mut rejected = 0usize;
    for event in events {
        if pipeline.ingest(event).is_err() {
            rejected += 1;
        }
    }

    // Jump past the last window boundary so every window closes
    clock.set(last + chrono::Duration::seconds(config.engine.window_size_seconds * 2));
    let verdicts = pipeline.tick();

    let mut writer = VerdictWriter::new(OutputFormat::Console, None)?;
    let mut anomalies = 0usize;
    for verdict in &verdicts {
        if verdict.is_anomaly {
            anomalies += 1;
        }
        if !anomalies_only || verdict.is_anomaly {
            writer.write_verdict(verdict)?;
        }
    }

    println!(
        "\nScanned {:?}: {} verdicts, {} anomalies, {} malformed lines, {} rejected events",
        file,
        verdicts.len(),
        anomalies,
        skipped,
        rejected
    );
    Ok(())
}
