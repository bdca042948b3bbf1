//! Detection session lifecycle: Idle → Armed → Running → Finalizing → Idle,
//! the running prediction tally, end-of-session verdicts, and a bounded
//! history of finalized sessions.

use crate::model::PredictionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// A session is anomalous when more than this share of readings flagged...
pub const ANOMALY_PERCENTAGE_THRESHOLD: f64 = 20.0;
/// ...or when the average anomaly score exceeds this.
pub const AVG_SCORE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Armed,
    Running,
    Finalizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    Timeout,
    AnalysisComplete,
    SourceDisconnect,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Manual => "manual",
            StopReason::Timeout => "timeout",
            StopReason::AnalysisComplete => "analysis_complete",
            StopReason::SourceDisconnect => "source_disconnect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictDecision {
    Anomalous,
    Normal,
    InsufficientData,
}

impl VerdictDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictDecision::Anomalous => "anomalous",
            VerdictDecision::Normal => "normal",
            VerdictDecision::InsufficientData => "insufficient_data",
        }
    }
}

/// One bounded run of live anomaly monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub state: SessionState,
    pub predictions: Vec<PredictionResult>,
    pub stop_reason: Option<StopReason>,
}

/// The single user-facing pass/fail contract for a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionVerdict {
    pub decision: VerdictDecision,
    pub anomaly_count: usize,
    pub total_predictions: usize,
    pub anomaly_percentage: f64,
    pub avg_confidence: f64,
    pub avg_score: f64,
    pub summary: String,
}

impl SessionVerdict {
    /// Dual-threshold rule: anomalous when more than 20% of readings
    /// flagged OR the average score exceeds 0.7.
    pub fn from_predictions(predictions: &[PredictionResult]) -> Self {
        let total = predictions.len();
        if total == 0 {
            return Self {
                decision: VerdictDecision::InsufficientData,
                anomaly_count: 0,
                total_predictions: 0,
                anomaly_percentage: 0.0,
                avg_confidence: 0.0,
                avg_score: 0.0,
                summary: "not enough data collected for analysis".to_string(),
            };
        }

        let anomaly_count = predictions.iter().filter(|p| p.is_anomaly).count();
        let anomaly_percentage = anomaly_count as f64 / total as f64 * 100.0;
        let avg_confidence =
            predictions.iter().map(|p| p.confidence).sum::<f64>() / total as f64;
        let avg_score = predictions.iter().map(|p| p.score).sum::<f64>() / total as f64;

        let anomalous = anomaly_percentage > ANOMALY_PERCENTAGE_THRESHOLD
            || avg_score > AVG_SCORE_THRESHOLD;

        let (decision, summary) = if anomalous {
            (
                VerdictDecision::Anomalous,
                format!(
                    "anomalous signal detected: {:.1}% of readings flagged; inspection required",
                    anomaly_percentage
                ),
            )
        } else {
            (
                VerdictDecision::Normal,
                format!(
                    "normal signal: {:.1}% anomalous readings; material appears healthy",
                    anomaly_percentage
                ),
            )
        };

        Self {
            decision,
            anomaly_count,
            total_predictions: total,
            anomaly_percentage,
            avg_confidence,
            avg_score,
            summary,
        }
    }
}

/// A finalized session paired with its verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: DetectionSession,
    pub verdict: SessionVerdict,
}

/// Bounded FIFO of finalized sessions, oldest evicted past the limit.
pub struct SessionHistory {
    records: VecDeque<SessionRecord>,
    limit: usize,
}

impl SessionHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, record: SessionRecord) {
        self.records.push_back(record);
        while self.records.len() > self.limit {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &SessionRecord> {
        self.records.iter()
    }
}

/// Start rejection conditions, reported synchronously to the command issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    SourceNotConnected,
    NoModelSelected,
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::SourceNotConnected => {
                write!(f, "reading source not connected; connect a source first")
            }
            StartError::NoModelSelected => {
                write!(f, "no model selected; select a model first")
            }
        }
    }
}

impl std::error::Error for StartError {}

/// Identity of a freshly started session; the generation ties stop
/// triggers to the session they were armed for.
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: String,
    pub generation: u64,
    pub started_at: DateTime<Utc>,
}

/// A finalized session and its verdict, if one was computed.
#[derive(Debug, Clone)]
pub struct FinalizedSession {
    pub session: DetectionSession,
    pub verdict: Option<SessionVerdict>,
}

/// Owns the active session and the history. All mutation goes through the
/// pipeline's single lock; stop triggers race into `finalize`, where the
/// first caller with the live generation wins and later callers no-op.
pub struct SessionController {
    state: SessionState,
    active: Option<DetectionSession>,
    history: SessionHistory,
    max_predictions: usize,
    generation: u64,
}

impl SessionController {
    pub fn new(max_predictions: usize, history_limit: usize) -> Self {
        Self {
            state: SessionState::Idle,
            active: None,
            history: SessionHistory::new(history_limit),
            max_predictions,
            generation: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Generation of the currently active session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.id.as_str())
    }

    pub fn prediction_count(&self) -> usize {
        self.active.as_ref().map(|s| s.predictions.len()).unwrap_or(0)
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Idle → Armed → Running. Rejects when the source is down or no
    /// detector is selected; resets the tally and bumps the generation.
    pub fn start(
        &mut self,
        source_connected: bool,
        has_detector: bool,
    ) -> Result<StartedSession, StartError> {
        if !source_connected {
            return Err(StartError::SourceNotConnected);
        }
        if !has_detector {
            return Err(StartError::NoModelSelected);
        }

        self.state = SessionState::Armed;
        self.generation += 1;
        let started_at = Utc::now();
        let session = DetectionSession {
            id: Uuid::new_v4().to_string(),
            started_at,
            ended_at: None,
            state: SessionState::Running,
            predictions: Vec::new(),
            stop_reason: None,
        };
        let info = StartedSession {
            session_id: session.id.clone(),
            generation: self.generation,
            started_at,
        };
        self.active = Some(session);
        self.state = SessionState::Running;
        Ok(info)
    }

    /// Append a scored prediction to the running tally. Returns true when
    /// the tally has reached the count-based stop threshold.
    pub fn record(&mut self, prediction: PredictionResult) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        if let Some(session) = self.active.as_mut() {
            session.predictions.push(prediction);
            return session.predictions.len() >= self.max_predictions;
        }
        false
    }

    /// Running → Finalizing → Idle. Only the first trigger carrying the
    /// live generation finalizes; stale timers and racing triggers no-op.
    /// A source disconnect with an empty tally discards the session
    /// without computing a verdict or touching the history.
    pub fn finalize(&mut self, generation: u64, reason: StopReason) -> Option<FinalizedSession> {
        if self.state != SessionState::Running || generation != self.generation {
            return None;
        }
        let Some(mut session) = self.active.take() else {
            self.state = SessionState::Idle;
            return None;
        };

        self.state = SessionState::Finalizing;
        session.ended_at = Some(Utc::now());
        session.stop_reason = Some(reason);
        session.state = SessionState::Finalizing;

        let verdict = if reason == StopReason::SourceDisconnect && session.predictions.is_empty()
        {
            None
        } else {
            Some(SessionVerdict::from_predictions(&session.predictions))
        };

        if let Some(verdict) = &verdict {
            self.history.push(SessionRecord {
                session: session.clone(),
                verdict: verdict.clone(),
            });
        }

        self.state = SessionState::Idle;
        Some(FinalizedSession { session, verdict })
    }
}
