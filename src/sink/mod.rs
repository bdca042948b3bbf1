//! Outbound event fan-out. Each sink gets its own worker thread fed by an
//! unbounded channel: a slow or failing sink logs and drops its own
//! deliveries without blocking the producer loop or the other sinks.

mod jsonl;
mod store;

pub use jsonl::JsonlSink;
pub use store::StoreSink;

use crate::model::PredictionResult;
use crate::session::{SessionVerdict, StopReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing::warn;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Typed outbound messages published by the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Every reading, with the cheap features attached
    RawReading {
        value: f64,
        timestamp: f64,
        mean: f64,
        std_dev: f64,
        sample_count: u64,
    },
    /// A sampled reading scored during a running session
    Prediction {
        session_id: String,
        value: f64,
        timestamp: f64,
        prediction: PredictionResult,
    },
    SessionStarted {
        session_id: String,
        started_at: DateTime<Utc>,
        auto_stop_secs: u64,
        method: String,
    },
    SessionStopped {
        session_id: String,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        reason: StopReason,
        verdict: Option<SessionVerdict>,
    },
    #[serde(rename = "session_verdict")]
    Verdict {
        session_id: String,
        verdict: SessionVerdict,
    },
}

/// Best-effort consumer of outbound events.
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;
    fn deliver(&self, event: &OutboundEvent) -> Result<(), SinkError>;
}

struct SinkWorker {
    name: String,
    tx: Option<mpsc::Sender<OutboundEvent>>,
    handle: Option<JoinHandle<()>>,
}

/// Fan-out over a fixed set of sinks, one worker thread per sink.
pub struct SinkFanout {
    workers: Vec<SinkWorker>,
}

impl SinkFanout {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let workers = sinks
            .into_iter()
            .map(|sink| {
                let name = sink.name().to_string();
                let (tx, rx) = mpsc::channel::<OutboundEvent>();
                let thread_name = name.clone();
                let handle = std::thread::spawn(move || {
                    while let Ok(event) = rx.recv() {
                        if let Err(e) = sink.deliver(&event) {
                            warn!(sink = %thread_name, error = %e, "sink delivery failed");
                        }
                    }
                });
                SinkWorker {
                    name,
                    tx: Some(tx),
                    handle: Some(handle),
                }
            })
            .collect();
        Self { workers }
    }

    /// Queue an event on every sink. Never blocks; a sink whose worker has
    /// died simply misses the event.
    pub fn publish(&self, event: &OutboundEvent) {
        for worker in &self.workers {
            if let Some(tx) = &worker.tx {
                if tx.send(event.clone()).is_err() {
                    warn!(sink = %worker.name, "sink worker gone; event dropped");
                }
            }
        }
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name.as_str()).collect()
    }
}

impl Drop for SinkFanout {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            worker.tx.take();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
