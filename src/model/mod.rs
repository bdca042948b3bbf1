//! Anomaly scoring: prediction types plus the threshold-owning detector
//! that dispatches to one of two backends (rule-based, ONNX model) with
//! deterministic fallback.

mod rule;
mod onnx;

pub use onnx::OnnxScorer;
pub use rule::RuleBasedScorer;

use crate::features::FeatureSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use tracing::warn;

/// Number of features fed to a model backend, in [`model_input`] order.
pub const MODEL_INPUT_DIM: usize = 10;

/// The fixed, ordered feature subset consumed by model backends.
pub fn model_input(f: &FeatureSet) -> [f32; MODEL_INPUT_DIM] {
    [
        f.mean as f32,
        f.std_dev as f32,
        f.min as f32,
        f.max as f32,
        f.range as f32,
        f.median as f32,
        f.q25 as f32,
        f.q75 as f32,
        f.sample_count as f32,
        f.time_span as f32,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    WarmingUp,
    MlReady,
    Error,
}

/// Which backend produced a score. Serialized as `rule_based` or
/// `model:<backend>` in event payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreMethod {
    RuleBased,
    Model(String),
}

impl ScoreMethod {
    pub fn label(&self) -> String {
        match self {
            ScoreMethod::RuleBased => "rule_based".to_string(),
            ScoreMethod::Model(backend) => format!("model:{}", backend),
        }
    }
}

impl std::fmt::Display for ScoreMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for ScoreMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for ScoreMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "rule_based" {
            Ok(ScoreMethod::RuleBased)
        } else if let Some(backend) = s.strip_prefix("model:") {
            Ok(ScoreMethod::Model(backend.to_string()))
        } else {
            Err(serde::de::Error::custom(format!("unknown score method: {}", s)))
        }
    }
}

/// One scored reading. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Anomaly score in [0, 1]
    pub score: f64,
    pub is_anomaly: bool,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub method: ScoreMethod,
    pub status: PredictionStatus,
    /// min(sample_count / window_size, 1.0)
    pub window_progress: f64,
}

enum Backend {
    RuleBased(RuleBasedScorer),
    Onnx(OnnxScorer),
}

/// Stateless-per-call scorer owning the decision threshold and an optional
/// model handle. Backend selection happens once at load time.
pub struct AnomalyDetector {
    backend: Backend,
    threshold: f64,
    window_size: usize,
}

impl AnomalyDetector {
    pub fn rule_based(window_size: usize, threshold: f64) -> Self {
        Self {
            backend: Backend::RuleBased(RuleBasedScorer),
            threshold: threshold.clamp(0.0, 1.0),
            window_size,
        }
    }

    /// Load a model artifact. Any load failure falls back to the rule-based
    /// backend; loading never errors out to the caller.
    pub fn load(path: &Path, window_size: usize, threshold: f64) -> Self {
        let backend = match OnnxScorer::load(path) {
            Ok(scorer) => Backend::Onnx(scorer),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "model load failed; using rule-based scoring");
                Backend::RuleBased(RuleBasedScorer)
            }
        };
        Self {
            backend,
            threshold: threshold.clamp(0.0, 1.0),
            window_size,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Clamp to [0, 1]; takes effect on the next predict call.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold.clamp(0.0, 1.0);
    }

    /// Backend tag for the active variant.
    pub fn method(&self) -> ScoreMethod {
        match &self.backend {
            Backend::RuleBased(_) => ScoreMethod::RuleBased,
            Backend::Onnx(_) => ScoreMethod::Model("onnx".to_string()),
        }
    }

    /// Score one feature set. Short-circuits to `WarmingUp` until the
    /// sample count reaches the window size, without invoking any backend.
    pub fn predict(&self, features: &FeatureSet) -> PredictionResult {
        let window_progress =
            (features.sample_count as f64 / self.window_size.max(1) as f64).min(1.0);

        if features.sample_count < self.window_size as u64 {
            return PredictionResult {
                score: 0.0,
                is_anomaly: false,
                confidence: 0.0,
                method: self.method(),
                status: PredictionStatus::WarmingUp,
                window_progress,
            };
        }

        let (score, confidence, method) = match &self.backend {
            Backend::RuleBased(scorer) => {
                let (score, confidence) = scorer.score(features);
                (score, confidence, ScoreMethod::RuleBased)
            }
            Backend::Onnx(scorer) => match scorer.score(features) {
                Ok(raw) => {
                    let score = raw.clamp(0.0, 1.0);
                    (
                        score,
                        threshold_confidence(score, self.threshold),
                        ScoreMethod::Model("onnx".to_string()),
                    )
                }
                Err(e) => {
                    warn!(error = %e, "model inference failed; rule-based fallback for this reading");
                    let (score, confidence) = RuleBasedScorer.score(features);
                    (score, confidence, ScoreMethod::RuleBased)
                }
            },
        };

        PredictionResult {
            score,
            is_anomaly: score > self.threshold,
            confidence,
            method,
            status: PredictionStatus::MlReady,
            window_progress,
        }
    }
}

/// Normalized distance of the score from the decision threshold.
fn threshold_confidence(score: f64, threshold: f64) -> f64 {
    let confidence = if score > threshold {
        (score - threshold).abs() / (1.0 - threshold)
    } else {
        (score - threshold).abs() / threshold
    };
    if confidence.is_finite() {
        confidence.min(1.0)
    } else {
        1.0
    }
}
