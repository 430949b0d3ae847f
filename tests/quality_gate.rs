// tests/quality_gate.rs
//
// Correlation against the metrics log plus verdict/alert behavior.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use medallion_pipeline::notify::{AlertSink, MockAlertSink};
use medallion_pipeline::{
    DatasetId, GateStatus, MemoryMetricsLog, MetricsEvent, MetricsLog, QualityGate, RunContext,
    Stage, Thresholds,
};

fn silver_metrics(path: &str, row_count: u64, link_nulls: u64, regions: u64) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("row_count".into(), json!(row_count));
    m.insert("null_counts".into(), json!({ "link": link_nulls }));
    m.insert("distinct_regions".into(), json!(regions));
    m.insert("silver_path".into(), json!(path));
    m
}

fn append_silver(log: &MemoryMetricsLog, metrics: Map<String, Value>) {
    let ctx = RunContext::mint("medallion_pipeline");
    log.append(&MetricsEvent::new(Stage::Silver, &ctx, "silver", metrics))
        .unwrap();
}

#[tokio::test]
async fn round_trip_matches_exactly_the_logged_dataset() {
    let log = Arc::new(MemoryMetricsLog::new());
    // An unrelated dataset with terrible metrics must not leak into the verdict.
    append_silver(&log, silver_metrics("/data/silver/run_other", 1, 1, 1));
    append_silver(&log, silver_metrics("/data/silver/run_x", 200, 10, 10));

    let gate = QualityGate::new(log, None);
    let outcome = gate
        .evaluate(
            &DatasetId::new("/data/silver/run_x"),
            &[],
            &Thresholds::default(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(outcome.artifact.status, GateStatus::Ok);
    assert!(outcome.artifact.issues.is_empty());
}

#[tokio::test]
async fn most_recent_event_wins_for_the_same_dataset() {
    let log = Arc::new(MemoryMetricsLog::new());
    // Stale event says the dataset was empty; the rewrite fixed it.
    append_silver(&log, silver_metrics("/data/silver/run_x", 0, 0, 0));
    append_silver(&log, silver_metrics("/data/silver/run_x", 200, 0, 10));

    let gate = QualityGate::new(log, None);
    let outcome = gate
        .evaluate(
            &DatasetId::new("/data/silver/run_x"),
            &[],
            &Thresholds::default(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(outcome.artifact.status, GateStatus::Ok);
}

#[tokio::test]
async fn unknown_dataset_warns_and_alerts() {
    let log = Arc::new(MemoryMetricsLog::new());
    let sink = Arc::new(MockAlertSink::new());
    let gate = QualityGate::new(log, Some(sink.clone() as Arc<dyn AlertSink>));

    let outcome = gate
        .evaluate(
            &DatasetId::new("/data/silver/run_missing"),
            &["ops@example.com".to_string()],
            &Thresholds::default(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(outcome.artifact.status, GateStatus::Warn);
    assert_eq!(outcome.artifact.issues.len(), 1);
    assert!(outcome.artifact.issues[0].contains("no metrics found"));

    let calls = sink.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].recipients, vec!["ops@example.com"]);
    assert!(calls[0].subject.contains("missing metrics"));
}

#[tokio::test]
async fn unknown_dataset_classifies_as_fail_when_fail_on_error() {
    let log = Arc::new(MemoryMetricsLog::new());
    let gate = QualityGate::new(log, None);

    let outcome = gate
        .evaluate(
            &DatasetId::new("/data/silver/run_missing"),
            &[],
            &Thresholds::default(),
            true,
        )
        .await
        .unwrap();

    assert_eq!(outcome.artifact.status, GateStatus::Fail);
    assert_eq!(outcome.artifact.issues.len(), 1);
    assert!(outcome.artifact.issues[0].contains("no metrics found"));
}

#[tokio::test]
async fn violations_alert_with_issue_list_and_raw_metrics() {
    let log = Arc::new(MemoryMetricsLog::new());
    append_silver(&log, silver_metrics("/data/silver/run_x", 10, 0, 10));
    let sink = Arc::new(MockAlertSink::new());
    let gate = QualityGate::new(log, Some(sink.clone() as Arc<dyn AlertSink>));

    let outcome = gate
        .evaluate(
            &DatasetId::new("/data/silver/run_x"),
            &["ops@example.com".to_string()],
            &Thresholds::default(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(outcome.artifact.status, GateStatus::Warn);

    let calls = sink.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].html_body.contains("row_count 10 below min_rows 50"));
    // Raw metrics payload rides along for diagnosis.
    assert!(calls[0].html_body.contains("\"row_count\": 10"));
}

#[tokio::test]
async fn alert_delivery_failure_is_swallowed() {
    let log = Arc::new(MemoryMetricsLog::new());
    append_silver(&log, silver_metrics("/data/silver/run_x", 10, 0, 10));
    let sink = Arc::new(MockAlertSink::failing());
    let gate = QualityGate::new(log, Some(sink.clone() as Arc<dyn AlertSink>));

    let outcome = gate
        .evaluate(
            &DatasetId::new("/data/silver/run_x"),
            &["ops@example.com".to_string()],
            &Thresholds::default(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(outcome.artifact.status, GateStatus::Warn);
    assert!(outcome
        .diagnostics
        .soft_failures
        .iter()
        .any(|s| s.contains("alert delivery failed")));
}

#[tokio::test]
async fn rule_violations_classify_as_fail_when_fail_on_error() {
    let log = Arc::new(MemoryMetricsLog::new());
    append_silver(&log, silver_metrics("/data/silver/run_x", 0, 0, 0));
    let gate = QualityGate::new(log, None);

    let outcome = gate
        .evaluate(
            &DatasetId::new("/data/silver/run_x"),
            &[],
            &Thresholds::default(),
            true,
        )
        .await
        .unwrap();

    assert_eq!(outcome.artifact.status, GateStatus::Fail);
    assert_eq!(
        outcome.artifact.issues,
        vec!["silver dataset is empty (row_count=0)"]
    );
}

#[tokio::test]
async fn no_recipients_means_no_alert_attempt() {
    let log = Arc::new(MemoryMetricsLog::new());
    append_silver(&log, silver_metrics("/data/silver/run_x", 10, 0, 10));
    let sink = Arc::new(MockAlertSink::new());
    let gate = QualityGate::new(log, Some(sink.clone() as Arc<dyn AlertSink>));

    let outcome = gate
        .evaluate(
            &DatasetId::new("/data/silver/run_x"),
            &[],
            &Thresholds::default(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(outcome.artifact.status, GateStatus::Warn);
    assert!(sink.calls.lock().unwrap().is_empty());
}
