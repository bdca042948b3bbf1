//! voltwatch — Streaming voltage anomaly detection agent.
//!
//! Modular structure:
//! - [`source`] — Reading sources: serial-line reader, simulated waveform
//! - [`features`] — Rolling-window statistical feature extraction
//! - [`model`] — Anomaly scoring: rule-based and ONNX backends
//! - [`session`] — Detection session lifecycle, verdicts, bounded history
//! - [`stream`] — Pipeline coordinator: sampling, commands, auto-stop
//! - [`sink`] — Fan-out event delivery to isolated sinks
//! - [`storage`] — Encrypted local session/prediction store
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod source;
pub mod features;
pub mod model;
pub mod session;
pub mod stream;
pub mod sink;
pub mod storage;
pub mod logging;
pub mod uplink;

pub use config::AgentConfig;
pub use source::{Reading, ReadingSource};
pub use features::{FeatureExtractor, FeatureSet};
pub use model::{AnomalyDetector, PredictionResult, PredictionStatus, ScoreMethod};
pub use session::{
    SessionController, SessionState, SessionVerdict, StartError, StopReason, VerdictDecision,
};
pub use stream::{Pipeline, PipelineStatus, StartStatus, StopStatus};
pub use sink::{EventSink, OutboundEvent, SinkFanout};
pub use storage::SessionStore;
pub use logging::StructuredLogger;
pub use uplink::UplinkSink;
