//! Storage benchmark: encrypted prediction inserts (low-power device target).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use voltwatch::storage::SessionStore;

fn bench_insert_prediction(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(&dir.path().join("bench.db"), b"bench-secret").unwrap();
    let payload = r#"{"score":0.42,"is_anomaly":false,"confidence":0.6,"method":"rule_based","status":"ml_ready","window_progress":1.0}"#;

    let mut ts = 0i64;
    c.bench_function("store_insert_prediction", |b| {
        b.iter(|| {
            ts += 1;
            store
                .insert_prediction(black_box("bench-session"), ts, Some(0.42), payload)
                .unwrap()
        })
    });
}

fn bench_insert_session(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(&dir.path().join("bench.db"), b"bench-secret").unwrap();
    let verdict = r#"{"decision":"normal","anomaly_count":1,"total_predictions":50,"anomaly_percentage":2.0,"avg_confidence":0.6,"avg_score":0.2,"summary":"normal signal"}"#;

    let mut i = 0u64;
    c.bench_function("store_insert_session", |b| {
        b.iter(|| {
            i += 1;
            store
                .insert_session(
                    black_box(&format!("session-{}", i)),
                    i as i64,
                    Some(i as i64 + 30_000),
                    "timeout",
                    Some(verdict),
                )
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_insert_prediction, bench_insert_session);
criterion_main!(benches);
