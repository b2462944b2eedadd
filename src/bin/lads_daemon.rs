use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use lads::alerting::{AlertDispatcher, AlertQueue};
use lads::clock::SystemClock;
use lads::config::Config;
use lads::geolocation::CountryResolver;
use lads::input::LoginLogTailer;
use lads::output::{OutputFormat, VerdictWriter};
use lads::pipeline::Pipeline;
use lads::store::{EventStore, MemoryEventStore, SqliteEventStore};

/// Main daemon entry point for the login anomaly detection system
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting LADS daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Event store backend
    let store: Arc<dyn EventStore> = match config.store.backend.as_str() {
        "sqlite" => {
            let path = config
                .store
                .db_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("lads_events.db"));
            log::info!("Using SQLite event store at {:?}", path);
            Arc::new(SqliteEventStore::new(path)?)
        }
        _ => Arc::new(MemoryEventStore::new()),
    };

    let pipeline = Pipeline::new(&config.engine, store, Arc::new(SystemClock));

    // Graceful shutdown: the same flag also abandons a fit in progress
    let shutdown = pipeline.shutdown_flag();
    let s = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        s.store(true, Ordering::SeqCst);
    })?;

    // Verdict output
    let output_format = OutputFormat::from_str(&config.output.format);
    let mut writer = VerdictWriter::new(output_format, config.output.file_path.clone())?;

    // Optional country resolution for events missing a country code
    let resolver = if config.geoip.enabled {
        match config.geoip.db_path.as_ref() {
            Some(path) => match CountryResolver::new(path) {
                Ok(r) => {
                    log::info!("GeoIP country lookups enabled ({:?})", path);
                    Some(r)
                }
                Err(e) => {
                    log::warn!("GeoIP disabled: {}", e);
                    None
                }
            },
            None => None,
        }
    } else {
        None
    };

    // Async alert dispatcher on its own runtime thread
    let (alert_tx, alert_rx) = AlertDispatcher::create_channel();
    let alert_queue = AlertQueue::new(alert_tx);
    let dispatcher = AlertDispatcher::new(config.alerting.clone());
    let alert_thread = std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("Failed to build alert runtime");
        runtime.block_on(dispatcher.run(alert_rx));
    });

    // Input: tail the CSV login log
    let mut tailer = LoginLogTailer::new(config.input.log_path.clone());
    tailer.initialize(config.input.from_start)?;
    log::info!("Tailing login log: {:?}", config.input.log_path);
    log::info!("Daemon running. Press Ctrl+C to stop.");

    // Main loop: ingest new rows, close elapsed windows, emit verdicts
    while !shutdown.load(Ordering::SeqCst) {
        if tailer.is_valid() {
            match tailer.read_events() {
                Ok(events) => {
                    for mut event in events {
                        if event.country_code.is_none() {
                            if let Some(ref resolver) = resolver {
                                event.country_code = resolver.lookup_optional(&event.source_ip);
                            }
                        }
                        if let Err(e) = pipeline.ingest(event) {
                            log::warn!("Rejected event: {}", e);
                        }
                    }
                }
                Err(e) => log::error!("Error reading login log: {}", e),
            }
        }

        for verdict in pipeline.tick() {
            if let Err(e) = writer.write_verdict(&verdict) {
                log::error!("Failed to write verdict: {}", e);
            }
            if verdict.is_anomaly {
                alert_queue.queue_alert(verdict);
            }
        }

        std::thread::sleep(Duration::from_millis(100));
    }

    writer.flush()?;
    drop(alert_queue);
    if alert_thread.join().is_err() {
        log::warn!("Alert dispatcher thread panicked");
    }
    log::info!(
        "LADS daemon stopped ({} late events observed)",
        pipeline.late_event_count()
    );
    Ok(())
}
