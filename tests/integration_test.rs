//! Integration tests: config load, feature extraction, scoring backends,
//! storage round-trips.

use std::path::Path;
use voltwatch::features::{FeatureExtractor, FeatureSet};
use voltwatch::model::{
    AnomalyDetector, PredictionStatus, RuleBasedScorer, ScoreMethod,
};
use voltwatch::sink::{EventSink, JsonlSink, OutboundEvent};
use voltwatch::source::{LineSource, ReadingSource, SimulatedSource};
use voltwatch::storage::SessionStore;
use voltwatch::AgentConfig;

#[test]
fn config_load_default() {
    let c = AgentConfig::load(Path::new("nonexistent.json"));
    assert_eq!(c.window.window_size, 50);
    assert_eq!(c.window.sample_every_n, 3);
    assert_eq!(c.detection.threshold, 0.5);
    assert_eq!(c.detection.auto_stop_secs, 30);
    assert_eq!(c.detection.max_predictions, 50);
    assert_eq!(c.detection.history_limit, 10);
    assert!(!c.uplink.enabled);
}

#[test]
fn first_reading_features() {
    let mut ex = FeatureExtractor::new(50);
    let f = ex.process(2.5, 0.0);
    assert_eq!(f.mean, 2.5);
    assert_eq!(f.std_dev, 0.0);
    assert_eq!(f.range, 0.0);
    assert_eq!(f.sample_count, 1);
    assert_eq!(f.buffer_size, 1);
    assert!(!f.window_full);
    assert_eq!(f.zero_crossings, 0);
    assert_eq!(f.time_since_start, 0.0);
}

#[test]
fn window_full_at_exact_capacity() {
    let mut ex = FeatureExtractor::new(5);
    let mut last = FeatureSet::default();
    for i in 0..5 {
        last = ex.process(i as f64, i as f64 * 0.1);
    }
    assert!(last.window_full);
    assert_eq!(last.buffer_size, 5);

    // Stays full (and bounded) past capacity
    let next = ex.process(9.0, 0.5);
    assert!(next.window_full);
    assert_eq!(next.buffer_size, 5);
    assert_eq!(next.sample_count, 6);
}

#[test]
fn constant_window_has_zero_skew_and_kurtosis() {
    let mut ex = FeatureExtractor::new(10);
    let mut last = FeatureSet::default();
    for i in 0..10 {
        last = ex.process(3.3, i as f64 * 0.1);
    }
    assert_eq!(last.std_dev, 0.0);
    assert_eq!(last.skewness, 0.0);
    assert_eq!(last.kurtosis, 0.0);
    assert_eq!(last.cv, 0.0);
}

#[test]
fn interpolated_percentiles() {
    let mut ex = FeatureExtractor::new(10);
    let mut last = FeatureSet::default();
    for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
        last = ex.process(*v, i as f64 * 0.1);
    }
    assert!((last.median - 2.5).abs() < 1e-9);
    assert!((last.q25 - 1.75).abs() < 1e-9);
    assert!((last.q75 - 3.25).abs() < 1e-9);
    assert!((last.iqr - 1.5).abs() < 1e-9);
}

#[test]
fn zero_crossings_and_peaks() {
    let mut ex = FeatureExtractor::new(10);
    let mut last = FeatureSet::default();
    for (i, v) in [1.0, -1.0, 1.0, -1.0].iter().enumerate() {
        last = ex.process(*v, i as f64 * 0.1);
    }
    assert_eq!(last.zero_crossings, 3);

    ex.reset();
    for (i, v) in [0.0, 2.0, 0.0, 2.0, 0.0].iter().enumerate() {
        last = ex.process(*v, i as f64 * 0.1);
    }
    assert_eq!(last.peak_count, 2);
}

#[test]
fn skew_sign_on_asymmetric_window() {
    let mut ex = FeatureExtractor::new(10);
    let mut last = FeatureSet::default();
    for (i, v) in [1.0, 1.0, 1.0, 10.0].iter().enumerate() {
        last = ex.process(*v, i as f64 * 0.1);
    }
    assert!(last.skewness > 0.0);
}

#[test]
fn sampling_rate_from_deltas() {
    let mut ex = FeatureExtractor::new(10);
    let mut last = FeatureSet::default();
    for i in 0..5 {
        last = ex.process(1.0, i as f64 * 0.1);
    }
    assert!((last.sampling_rate - 10.0).abs() < 1e-6);
    assert!((last.avg_interval - 0.1).abs() < 1e-9);
    assert!((last.time_span - 0.4).abs() < 1e-9);
}

#[test]
fn reset_behaves_as_first_reading() {
    let mut ex = FeatureExtractor::new(10);
    for i in 0..7 {
        ex.process(2.0, 100.0 + i as f64);
    }
    ex.reset();
    assert_eq!(ex.sample_count(), 0);
    assert!(ex.snapshot().values.is_empty());

    let f = ex.process(5.0, 500.0);
    assert_eq!(f.sample_count, 1);
    assert_eq!(f.buffer_size, 1);
    // Fresh start_time: the clock restarts at the new first timestamp
    assert_eq!(f.time_since_start, 0.0);
}

#[test]
fn window_resize_keeps_most_recent() {
    let mut ex = FeatureExtractor::new(10);
    for i in 1..=10 {
        ex.process(i as f64, i as f64 * 0.1);
    }
    ex.set_window_size(5);
    let snap = ex.snapshot();
    assert_eq!(snap.values, vec![6.0, 7.0, 8.0, 9.0, 10.0]);
    assert_eq!(snap.window_size, 5);
    assert!(snap.is_full);
}

#[test]
fn rule_scorer_increments_and_confidence() {
    let features = FeatureSet {
        std_dev: 0.6,
        range: 2.5,
        skewness: 0.2,
        kurtosis: 1.0,
        ..FeatureSet::default()
    };
    let (score, confidence) = RuleBasedScorer.score(&features);
    assert!((score - 0.5).abs() < 1e-9);
    assert!((confidence - 0.68).abs() < 1e-9);

    // All rules firing stays capped at 1.0, confidence at 0.8
    let wild = FeatureSet {
        std_dev: 5.0,
        range: 10.0,
        skewness: 3.0,
        kurtosis: 9.0,
        ..FeatureSet::default()
    };
    let (score, confidence) = RuleBasedScorer.score(&wild);
    assert!((score - 0.9).abs() < 1e-9);
    assert!((confidence - 0.8).abs() < 1e-9);
}

#[test]
fn detector_warms_up_below_window() {
    let detector = AnomalyDetector::rule_based(50, 0.5);
    let features = FeatureSet {
        sample_count: 49,
        std_dev: 9.0,
        range: 9.0,
        ..FeatureSet::default()
    };
    let p = detector.predict(&features);
    assert_eq!(p.status, PredictionStatus::WarmingUp);
    assert_eq!(p.score, 0.0);
    assert!(!p.is_anomaly);
    assert_eq!(p.confidence, 0.0);
}

#[test]
fn detector_ml_ready_at_window() {
    let detector = AnomalyDetector::rule_based(50, 0.4);
    let features = FeatureSet {
        sample_count: 50,
        std_dev: 0.6,
        range: 2.5,
        ..FeatureSet::default()
    };
    let p = detector.predict(&features);
    assert_eq!(p.status, PredictionStatus::MlReady);
    assert!((p.score - 0.5).abs() < 1e-9);
    assert!(p.is_anomaly);
    assert_eq!(p.method, ScoreMethod::RuleBased);
    assert_eq!(p.window_progress, 1.0);
}

#[test]
fn threshold_update_is_prospective() {
    let mut detector = AnomalyDetector::rule_based(10, 0.4);
    let features = FeatureSet {
        sample_count: 10,
        std_dev: 0.6,
        range: 2.5,
        ..FeatureSet::default()
    };
    let before = detector.predict(&features);
    assert!(before.is_anomaly);

    detector.set_threshold(0.9);
    let after = detector.predict(&features);
    assert!(!after.is_anomaly);
    // The earlier result is untouched
    assert!(before.is_anomaly);

    // Out-of-range values clamp
    detector.set_threshold(7.0);
    assert_eq!(detector.threshold(), 1.0);
    detector.set_threshold(-3.0);
    assert_eq!(detector.threshold(), 0.0);
}

#[test]
fn missing_model_falls_back_to_rules() {
    let detector = AnomalyDetector::load(Path::new("nonexistent.onnx"), 50, 0.5);
    assert_eq!(detector.method(), ScoreMethod::RuleBased);

    let features = FeatureSet {
        sample_count: 50,
        ..FeatureSet::default()
    };
    let p = detector.predict(&features);
    assert_eq!(p.status, PredictionStatus::MlReady);
    assert_eq!(p.method, ScoreMethod::RuleBased);
}

#[test]
fn score_method_labels() {
    assert_eq!(ScoreMethod::RuleBased.label(), "rule_based");
    assert_eq!(ScoreMethod::Model("onnx".into()).label(), "model:onnx");

    let json = serde_json::to_string(&ScoreMethod::Model("onnx".into())).unwrap();
    assert_eq!(json, "\"model:onnx\"");
    let parsed: ScoreMethod = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, ScoreMethod::Model("onnx".into()));
}

#[test]
fn simulated_source_emits_numeric_lines() {
    let mut sim = SimulatedSource::steady();
    for _ in 0..10 {
        let line = sim.next_line().unwrap().unwrap();
        let value: f64 = line.parse().unwrap();
        assert!(value.is_finite());
    }
}

#[test]
fn line_source_reads_and_trims() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readings.txt");
    std::fs::write(&path, "2.5\n\n 3.5 \n").unwrap();

    let mut src = LineSource::open(&path).unwrap();
    assert_eq!(src.next_line().unwrap(), Some("2.5".to_string()));
    assert_eq!(src.next_line().unwrap(), None); // blank line
    assert_eq!(src.next_line().unwrap(), Some("3.5".to_string()));
    assert_eq!(src.next_line().unwrap(), None); // EOF
}

#[test]
fn jsonl_sink_writes_one_json_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let sink = JsonlSink::open(&path).unwrap();
    sink.deliver(&OutboundEvent::RawReading {
        value: 2.5,
        timestamp: 0.1,
        mean: 2.5,
        std_dev: 0.0,
        sample_count: 1,
    })
    .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let line = content.lines().next().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(parsed["type"], "raw_reading");
    assert_eq!(parsed["value"], 2.5);
}

#[test]
fn storage_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let store = SessionStore::open(&path, b"test-secret").unwrap();

    store
        .insert_prediction("s1", 123, Some(0.7), r#"{"score":0.7}"#)
        .unwrap();
    store
        .insert_prediction("s1", 456, Some(0.2), r#"{"score":0.2}"#)
        .unwrap();
    store
        .insert_session("s1", 100, Some(900), "manual", Some(r#"{"decision":"normal"}"#))
        .unwrap();

    let session = store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.started_at, 100);
    assert_eq!(session.ended_at, Some(900));
    assert_eq!(session.stop_reason.as_deref(), Some("manual"));
    assert_eq!(session.verdict_json.as_deref(), Some(r#"{"decision":"normal"}"#));

    let predictions = store.session_predictions("s1").unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].0, 123);
    assert_eq!(predictions[0].2, r#"{"score":0.7}"#);

    assert_eq!(store.recent_sessions(5).unwrap(), vec!["s1".to_string()]);

    // Retention removes both rows
    let pruned = store.prune_before(1_000).unwrap();
    assert!(pruned >= 2);
    assert!(store.get_session("s1").unwrap().is_none());
}
