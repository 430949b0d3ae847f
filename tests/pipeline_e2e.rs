// tests/pipeline_e2e.rs
//
// Full bronze → silver → gold → dq runs against a stubbed source and a
// tempdir data root, with the file-backed metrics log.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use medallion_pipeline::ingest::source::DirectorySource;
use medallion_pipeline::notify::{AlertSink, MockAlertSink};
use medallion_pipeline::table::VersionedTable;
use medallion_pipeline::{
    FileMetricsLog, GateStatus, MetricsLog, Pipeline, PipelineConfig, PipelineError, RawRecord,
    Stage,
};

/// Serves `total` records, `page_size` at a time, spread over `regions`.
struct CannedSource {
    total: usize,
    regions: usize,
}

#[async_trait::async_trait]
impl DirectorySource for CannedSource {
    fn name(&self) -> &str {
        "canned"
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<RawRecord>> {
        let start = ((page - 1) * per_page) as usize;
        let end = (start + per_page as usize).min(self.total);
        Ok((start..end)
            .map(|i| {
                let mut rec = RawRecord::new();
                rec.insert("id".into(), json!(format!("rec-{i}")));
                rec.insert("name".into(), json!(format!("Entry {i}")));
                rec.insert("category".into(), json!("micro"));
                rec.insert("locality".into(), json!("Springfield"));
                rec.insert("region".into(), json!(format!("r{}", i % self.regions)));
                rec.insert("link".into(), json!(format!("http://example.com/{i}")));
                rec
            })
            .collect())
    }
}

fn config(data_root: &std::path::Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.data_root = data_root.to_path_buf();
    cfg
}

fn pipeline(
    cfg: PipelineConfig,
    source: CannedSource,
    alerts: Option<Arc<dyn AlertSink>>,
) -> Pipeline {
    let log: Arc<dyn MetricsLog> = Arc::new(FileMetricsLog::new(cfg.log_dir()));
    Pipeline::new(cfg, vec![Box::new(source)], log, alerts)
}

#[tokio::test]
async fn healthy_run_ends_ok_with_full_lineage() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());
    let source = CannedSource {
        total: 60,
        regions: 6,
    };

    let report = pipeline(cfg.clone(), source, None).run_once().await.unwrap();

    assert_eq!(report.verdict.status, GateStatus::Ok);
    assert!(report.diagnostics.is_clean());
    assert!(report.raw_snapshot.path().exists());
    assert!(report.dataset.path().exists());
    assert_eq!(report.gold_path, cfg.gold_table_root());

    // One event per data-bearing stage, all for the same run.
    let log = FileMetricsLog::new(cfg.log_dir());
    let events = log.scan(&|_| true).unwrap();
    assert_eq!(events.len(), 3);
    let run_ids: std::collections::BTreeSet<_> =
        events.iter().map(|(_, e)| e.run_id.clone()).collect();
    assert_eq!(run_ids.len(), 1);
    for stage in [Stage::Bronze, Stage::Silver, Stage::Gold] {
        assert_eq!(log.scan(&|e| e.stage == stage).unwrap().len(), 1, "{stage:?}");
    }

    // Silver lineage points at the dataset the report returned.
    let silver = log.scan(&|e| e.stage == Stage::Silver).unwrap();
    assert_eq!(
        silver[0].1.metric_str("silver_path"),
        Some(report.dataset.as_str().as_str())
    );

    // Dataset is physically partitioned by region.
    let partition_count = std::fs::read_dir(report.dataset.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("region="))
        .count();
    assert_eq!(partition_count, 6);

    // First run created table version 0.
    assert_eq!(
        VersionedTable::new(cfg.gold_table_root()).versions().unwrap(),
        vec![0]
    );
}

#[tokio::test]
async fn thin_run_warns_and_alerts_recipients() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.recipients = vec!["ops@example.com".to_string()];
    let source = CannedSource {
        total: 10,
        regions: 2,
    };
    let sink = Arc::new(MockAlertSink::new());

    let report = pipeline(cfg, source, Some(sink.clone() as Arc<dyn AlertSink>))
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.verdict.status, GateStatus::Warn);
    // 10 < 50 rows and 2 < 5 regions.
    assert_eq!(report.verdict.issues.len(), 2);

    let calls = sink.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].subject.contains("2 issue(s)"));
}

#[tokio::test]
async fn fail_on_error_escalates_a_thin_run() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());
    let source = CannedSource {
        total: 10,
        regions: 2,
    };

    let err = pipeline(cfg.clone(), source, None)
        .with_fail_on_error(true)
        .run_once()
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::QualityGateFailed { .. }));

    // The data artifacts were still produced; only the gate aborted.
    let log = FileMetricsLog::new(cfg.log_dir());
    assert_eq!(log.scan(&|_| true).unwrap().len(), 3);
}

#[tokio::test]
async fn consecutive_runs_append_table_versions_and_distinct_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());

    let r1 = pipeline(cfg.clone(), CannedSource { total: 60, regions: 6 }, None)
        .run_once()
        .await
        .unwrap();
    let r2 = pipeline(cfg.clone(), CannedSource { total: 60, regions: 6 }, None)
        .run_once()
        .await
        .unwrap();

    // Fresh identities per invocation, monotonic table growth.
    assert_ne!(r1.dataset, r2.dataset);
    assert_eq!(
        VersionedTable::new(cfg.gold_table_root()).versions().unwrap(),
        vec![0, 1]
    );
}
