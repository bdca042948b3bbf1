//! Pipeline coordinator: glues the reading source to the extractor → scorer
//! → session chain, applies the sampling divisor, fans events out to sinks,
//! and serializes commands with pipeline mutation behind a single lock.
//!
//! Stop triggers (timer, count, manual, disconnect) all funnel into one
//! finalize transition; the session generation makes the first trigger win
//! and turns the rest into no-ops.

use crate::config::AgentConfig;
use crate::features::FeatureExtractor;
use crate::model::{AnomalyDetector, PredictionStatus, ScoreMethod};
use crate::session::{
    FinalizedSession, SessionController, SessionRecord, SessionState, SessionVerdict, StartError,
    StopReason,
};
use crate::sink::{OutboundEvent, SinkFanout};
use crate::source::{MonotonicClock, Reading, ReadingSource};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

/// Synchronous outcome of a start command.
#[derive(Debug, Clone)]
pub enum StartStatus {
    Started { session_id: String },
    AlreadyRunning,
}

/// Synchronous outcome of a stop command.
#[derive(Debug, Clone)]
pub enum StopStatus {
    Stopped { verdict: Option<SessionVerdict> },
    NotRunning,
}

/// Point-in-time pipeline snapshot for status commands.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub source_connected: bool,
    pub paused: bool,
    pub session_state: SessionState,
    pub session_id: Option<String>,
    pub predictions_collected: usize,
    pub threshold: Option<f64>,
    pub method: Option<String>,
    pub sample_count: u64,
    pub window_size: usize,
    pub history_len: usize,
}

struct PipelineState {
    extractor: FeatureExtractor,
    detector: Option<AnomalyDetector>,
    controller: SessionController,
    sample_counter: u64,
    paused: bool,
    source_connected: bool,
    /// Threshold applied to detectors selected later
    fallback_threshold: f64,
    timer: Option<tokio::task::JoinHandle<()>>,
}

struct Inner {
    state: Mutex<PipelineState>,
    sinks: SinkFanout,
    sample_every_n: u64,
    auto_stop_secs: u64,
    poll_interval: Duration,
    idle_timeout_polls: u32,
}

/// The streaming coordinator. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(config: &AgentConfig, detector: Option<AnomalyDetector>, sinks: SinkFanout) -> Self {
        let state = PipelineState {
            extractor: FeatureExtractor::new(config.window.window_size),
            detector,
            controller: SessionController::new(
                config.detection.max_predictions,
                config.detection.history_limit,
            ),
            sample_counter: 0,
            paused: false,
            source_connected: false,
            fallback_threshold: config.detection.threshold.clamp(0.0, 1.0),
            timer: None,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                sinks,
                sample_every_n: config.window.sample_every_n.max(1),
                auto_stop_secs: config.detection.auto_stop_secs,
                poll_interval: Duration::from_millis(config.source.poll_interval_ms),
                idle_timeout_polls: config.source.idle_timeout_polls,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- commands ------------------------------------------------------

    /// Start a detection session. Requires a connected source and a
    /// selected detector; starting while one runs reports AlreadyRunning.
    pub fn start(&self) -> Result<StartStatus, StartError> {
        let mut events = Vec::new();
        let status = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.controller.is_running() {
                return Ok(StartStatus::AlreadyRunning);
            }
            let source_connected = s.source_connected;
            let has_detector = s.detector.is_some();
            let info = s.controller.start(source_connected, has_detector)?;
            self.arm_timer(s, info.generation);
            let method = s
                .detector
                .as_ref()
                .map(|d| d.method().label())
                .unwrap_or_default();
            events.push(OutboundEvent::SessionStarted {
                session_id: info.session_id.clone(),
                started_at: info.started_at,
                auto_stop_secs: self.inner.auto_stop_secs,
                method,
            });
            info!(session_id = %info.session_id, auto_stop_secs = self.inner.auto_stop_secs, "detection session started");
            StartStatus::Started {
                session_id: info.session_id,
            }
        };
        self.publish_all(events);
        Ok(status)
    }

    /// Stop the running session. Stopping while idle is a no-op.
    pub fn stop(&self) -> StopStatus {
        let mut events = Vec::new();
        let status = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if !s.controller.is_running() {
                return StopStatus::NotRunning;
            }
            let generation = s.controller.generation();
            match self.finalize_locked(s, generation, StopReason::Manual) {
                Some(outcome) => {
                    let verdict = outcome.verdict.clone();
                    events.extend(finalize_events(outcome));
                    StopStatus::Stopped { verdict }
                }
                None => StopStatus::NotRunning,
            }
        };
        self.publish_all(events);
        status
    }

    /// Suspend reading consumption; the window is preserved.
    pub fn pause(&self) {
        self.lock().paused = true;
        info!("data collection paused");
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        info!("data collection resumed");
    }

    /// Clamp and apply the decision threshold; prospective only.
    pub fn set_threshold(&self, threshold: f64) -> f64 {
        let mut s = self.lock();
        let clamped = threshold.clamp(0.0, 1.0);
        s.fallback_threshold = clamped;
        if let Some(detector) = s.detector.as_mut() {
            detector.set_threshold(clamped);
        }
        info!(threshold = clamped, "decision threshold updated");
        clamped
    }

    /// Load and install a model artifact; a failed load installs the
    /// rule-based fallback. Returns the resulting backend tag.
    pub fn select_model(&self, path: &Path) -> ScoreMethod {
        let (window_size, threshold) = {
            let s = self.lock();
            (s.extractor.window_size(), s.fallback_threshold)
        };
        let detector = AnomalyDetector::load(path, window_size, threshold);
        let method = detector.method();
        self.lock().detector = Some(detector);
        info!(path = %path.display(), method = %method, "model selected");
        method
    }

    /// Clear the window and sampling counter; the next reading behaves as
    /// the first ever seen.
    pub fn reset(&self) {
        let mut s = self.lock();
        s.extractor.reset();
        s.sample_counter = 0;
        info!("window reset");
    }

    pub fn status(&self) -> PipelineStatus {
        let s = self.lock();
        PipelineStatus {
            source_connected: s.source_connected,
            paused: s.paused,
            session_state: s.controller.state(),
            session_id: s.controller.active_session_id().map(String::from),
            predictions_collected: s.controller.prediction_count(),
            threshold: s.detector.as_ref().map(|d| d.threshold()),
            method: s.detector.as_ref().map(|d| d.method().label()),
            sample_count: s.extractor.sample_count(),
            window_size: s.extractor.window_size(),
            history_len: s.controller.history().len(),
        }
    }

    /// Finalized sessions, oldest first.
    pub fn history(&self) -> Vec<SessionRecord> {
        self.lock().controller.history().records().cloned().collect()
    }

    // ---- ingest path ---------------------------------------------------

    /// Mark the source attached or detached. `run_source` does this on its
    /// own; embedders pushing readings via [`Pipeline::ingest`] call it
    /// around their own source lifecycle.
    pub fn set_source_connected(&self, connected: bool) {
        self.lock().source_connected = connected;
    }

    /// Parse one raw source line. Non-numeric lines are dropped and logged.
    pub fn ingest_line(&self, line: &str, timestamp: f64) {
        match line.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => self.ingest(Reading::new(value, timestamp)),
            _ => warn!(line, "invalid reading dropped"),
        }
    }

    /// Feed one reading through extractor → (every Nth) scorer → session.
    pub fn ingest(&self, reading: Reading) {
        let mut events = Vec::new();
        {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.paused {
                return;
            }
            s.sample_counter += 1;
            let features = s.extractor.process(reading.value, reading.timestamp);
            events.push(OutboundEvent::RawReading {
                value: reading.value,
                timestamp: reading.timestamp,
                mean: features.mean,
                std_dev: features.std_dev,
                sample_count: features.sample_count,
            });

            let sampled = s.sample_counter % self.inner.sample_every_n == 0;
            if sampled && s.controller.is_running() {
                if let Some(detector) = s.detector.as_ref() {
                    let prediction = detector.predict(&features);
                    let session_id = s
                        .controller
                        .active_session_id()
                        .unwrap_or_default()
                        .to_string();
                    events.push(OutboundEvent::Prediction {
                        session_id,
                        value: reading.value,
                        timestamp: reading.timestamp,
                        prediction: prediction.clone(),
                    });
                    if prediction.status == PredictionStatus::MlReady
                        && s.controller.record(prediction)
                    {
                        let generation = s.controller.generation();
                        if let Some(outcome) =
                            self.finalize_locked(s, generation, StopReason::AnalysisComplete)
                        {
                            events.extend(finalize_events(outcome));
                        }
                    }
                }
            }
        }
        self.publish_all(events);
    }

    // ---- producer loop -------------------------------------------------

    /// Drive the pipeline from a reading source until shutdown or source
    /// failure. Blocking; run it on a dedicated thread or blocking task.
    pub fn run_source(&self, mut source: Box<dyn ReadingSource>, shutdown: Arc<AtomicBool>) {
        let clock = MonotonicClock::new();
        self.lock().source_connected = true;
        info!(source = source.name(), "reading source connected");

        let mut idle_polls: u32 = 0;
        while !shutdown.load(Ordering::Relaxed) {
            if self.lock().paused {
                std::thread::sleep(self.inner.poll_interval);
                continue;
            }
            match source.next_line() {
                Ok(Some(line)) => {
                    idle_polls = 0;
                    self.ingest_line(&line, clock.now());
                    std::thread::sleep(self.inner.poll_interval);
                }
                Ok(None) => {
                    idle_polls += 1;
                    if idle_polls >= self.inner.idle_timeout_polls {
                        self.handle_source_down("idle timeout");
                        return;
                    }
                    std::thread::sleep(self.inner.poll_interval);
                }
                Err(e) => {
                    warn!(error = %e, "source read failed");
                    self.handle_source_down(&e.to_string());
                    return;
                }
            }
        }
        self.handle_source_down("shutdown");
    }

    /// Source is gone: mark disconnected, force any running session into
    /// finalize, and clear the window for the next connection.
    pub fn handle_source_down(&self, why: &str) {
        let mut events = Vec::new();
        {
            let mut s = self.lock();
            s.source_connected = false;
            let generation = s.controller.generation();
            if let Some(outcome) =
                self.finalize_locked(&mut s, generation, StopReason::SourceDisconnect)
            {
                events.extend(finalize_events(outcome));
            }
            s.extractor.reset();
            s.sample_counter = 0;
        }
        warn!(why, "reading source disconnected");
        self.publish_all(events);
    }

    // ---- internals -----------------------------------------------------

    /// Arm the cancellable auto-stop timer for the given session generation.
    fn arm_timer(&self, s: &mut PipelineState, generation: u64) {
        if let Some(old) = s.timer.take() {
            old.abort();
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pipeline = self.clone();
                let secs = self.inner.auto_stop_secs;
                s.timer = Some(handle.spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    pipeline.finalize_by_timer(generation);
                }));
            }
            Err(_) => {
                warn!("no async runtime; auto-stop timer disabled for this session");
            }
        }
    }

    fn finalize_by_timer(&self, generation: u64) {
        let mut events = Vec::new();
        {
            let mut s = self.lock();
            if let Some(outcome) = self.finalize_locked(&mut s, generation, StopReason::Timeout) {
                events.extend(finalize_events(outcome));
            }
        }
        self.publish_all(events);
    }

    fn finalize_locked(
        &self,
        s: &mut PipelineState,
        generation: u64,
        reason: StopReason,
    ) -> Option<FinalizedSession> {
        let outcome = s.controller.finalize(generation, reason)?;
        if let Some(timer) = s.timer.take() {
            timer.abort();
        }
        match &outcome.verdict {
            Some(verdict) => info!(
                session_id = %outcome.session.id,
                reason = reason.as_str(),
                decision = verdict.decision.as_str(),
                anomaly_percentage = verdict.anomaly_percentage,
                "session finalized"
            ),
            None => info!(
                session_id = %outcome.session.id,
                reason = reason.as_str(),
                "session discarded without verdict"
            ),
        }
        Some(outcome)
    }

    fn publish_all(&self, events: Vec<OutboundEvent>) {
        for event in &events {
            self.inner.sinks.publish(event);
        }
    }
}

fn finalize_events(outcome: FinalizedSession) -> Vec<OutboundEvent> {
    let FinalizedSession { session, verdict } = outcome;
    let mut events = vec![OutboundEvent::SessionStopped {
        session_id: session.id.clone(),
        started_at: session.started_at,
        ended_at: session.ended_at,
        reason: session.stop_reason.unwrap_or(StopReason::Manual),
        verdict: verdict.clone(),
    }];
    if let Some(verdict) = verdict {
        events.push(OutboundEvent::Verdict {
            session_id: session.id,
            verdict,
        });
    }
    events
}
