//! voltwatch entrypoint: offline-first streaming anomaly detection agent.
//! Pulls readings from a serial line source (or the built-in simulator),
//! runs the rolling-window pipeline, and reports session verdicts to the
//! configured sinks until Ctrl+C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voltwatch::{
    config::AgentConfig,
    logging::StructuredLogger,
    model::AnomalyDetector,
    session::SessionState,
    sink::{EventSink, JsonlSink, SinkFanout, StoreSink},
    source::{LineSource, ReadingSource, SimulatedSource},
    storage::SessionStore,
    stream::{Pipeline, StartStatus},
    uplink::UplinkSink,
};

/// Stored rows older than this are pruned at startup.
const RETENTION_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("VOLTWATCH_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = AgentConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(data_dir = ?config.data_dir, "voltwatch agent starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let store_path = config.data_dir.join("store.db");
    let secret = b"device-secret-placeholder"; // In production: from Secure Enclave / Keystore
    let store = Arc::new(SessionStore::open(&store_path, secret)?);

    let cutoff = (chrono::Utc::now() - chrono::Duration::days(RETENTION_DAYS)).timestamp_millis();
    match store.prune_before(cutoff) {
        Ok(pruned) if pruned > 0 => info!(pruned, "old store rows pruned"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "store pruning failed"),
    }

    let mut sinks: Vec<Box<dyn EventSink>> = vec![
        Box::new(JsonlSink::open(&config.data_dir.join("events.jsonl"))?),
        Box::new(StoreSink::new(store.clone())),
    ];
    if config.uplink.enabled {
        if let Some(uplink) = UplinkSink::new(config.uplink.clone()) {
            sinks.push(Box::new(uplink));
        } else {
            warn!("uplink enabled but endpoint missing; uplink sink skipped");
        }
    }
    let fanout = SinkFanout::new(sinks);
    info!(sinks = ?fanout.sink_names(), "event sinks ready");

    let detector = config.detection.model_path.as_ref().map(|path| {
        AnomalyDetector::load(path, config.window.window_size, config.detection.threshold)
    });
    let pipeline = Pipeline::new(&config, detector, fanout);

    let source: Box<dyn ReadingSource> = if config.source.simulate {
        info!("using simulated reading source");
        Box::new(SimulatedSource::new())
    } else {
        let Some(path) = config.source.path.as_ref() else {
            return Err("no reading source configured: set source.path or source.simulate".into());
        };
        Box::new(LineSource::open(path)?)
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let _ = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
        });
    }

    let producer = {
        let pipeline = pipeline.clone();
        let shutdown = shutdown.clone();
        tokio::task::spawn_blocking(move || pipeline.run_source(source, shutdown))
    };

    info!(auto_start = config.detection.auto_start, "daemon running (Ctrl+C to stop)");
    while !shutdown.load(Ordering::Relaxed) {
        if producer.is_finished() {
            break;
        }
        if config.detection.auto_start {
            let status = pipeline.status();
            if status.source_connected
                && status.session_state == SessionState::Idle
                && status.method.is_some()
            {
                match pipeline.start() {
                    Ok(StartStatus::Started { session_id }) => {
                        info!(session_id = %session_id, "auto-started detection session");
                    }
                    Ok(StartStatus::AlreadyRunning) => {}
                    Err(e) => warn!(error = %e, "auto-start rejected"),
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    shutdown.store(true, Ordering::Relaxed);
    let _ = producer.await;

    for record in pipeline.history() {
        info!(
            session_id = %record.session.id,
            decision = record.verdict.decision.as_str(),
            anomaly_percentage = record.verdict.anomaly_percentage,
            "session result"
        );
    }

    info!("voltwatch agent stopping");
    Ok(())
}
