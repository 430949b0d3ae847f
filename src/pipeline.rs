// src/pipeline.rs
//! Sequential wiring of one bronze → silver → gold → dq run. Orchestration
//! proper (scheduling, retries, task-level fan-out) stays outside this crate;
//! this is the library call an orchestrator task would invoke.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::aggregate::Aggregator;
use crate::artifact::{DatasetId, RawSnapshotId};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::ingest::source::{DirectorySource, HttpDirectorySource};
use crate::ingest::Ingestor;
use crate::metrics_log::{FileMetricsLog, MetricsLog, RunContext};
use crate::normalize::Normalizer;
use crate::notify::AlertSink;
use crate::quality::{GateStatus, QualityGate, QualityVerdict, Thresholds};
use crate::table::VersionedTable;
use crate::types::Diagnostics;

/// Everything one completed run produced, plus the merged soft-failure
/// side-channel across all four stages.
#[derive(Debug)]
pub struct RunReport {
    pub raw_snapshot: RawSnapshotId,
    pub dataset: DatasetId,
    pub gold_path: PathBuf,
    pub verdict: QualityVerdict,
    pub diagnostics: Diagnostics,
}

pub struct Pipeline {
    config: PipelineConfig,
    sources: Vec<Box<dyn DirectorySource>>,
    log: Arc<dyn MetricsLog>,
    alerts: Option<Arc<dyn AlertSink>>,
    thresholds: Thresholds,
    fail_on_error: bool,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        sources: Vec<Box<dyn DirectorySource>>,
        log: Arc<dyn MetricsLog>,
        alerts: Option<Arc<dyn AlertSink>>,
    ) -> Self {
        Self {
            config,
            sources,
            log,
            alerts,
            thresholds: Thresholds::default(),
            fail_on_error: false,
        }
    }

    /// Standard wiring: HTTP sources from the configured endpoints and a
    /// file-backed metrics log under the data root.
    pub fn from_config(config: PipelineConfig, alerts: Option<Arc<dyn AlertSink>>) -> Self {
        let sources: Vec<Box<dyn DirectorySource>> = config
            .endpoints
            .iter()
            .map(|ep| Box::new(HttpDirectorySource::new(ep.clone())) as Box<dyn DirectorySource>)
            .collect();
        let log: Arc<dyn MetricsLog> = Arc::new(FileMetricsLog::new(config.log_dir()));
        Self::new(config, sources, log, alerts)
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }

    /// Run all four stages once. Consumes the pipeline: every run mints a
    /// fresh run id and fresh artifact identities.
    pub async fn run_once(self) -> Result<RunReport, PipelineError> {
        let ctx = RunContext::mint(&self.config.dag_id);
        info!(run_id = %ctx.run_id, "pipeline run starting");
        let mut diagnostics = Diagnostics::new();

        let ingestor = Ingestor::new(
            self.sources,
            self.config.bronze_dir(),
            self.log.clone(),
            ctx.clone(),
        );
        let bronze = ingestor
            .ingest(self.config.page_size, self.config.max_pages)
            .await?;
        diagnostics.merge(bronze.diagnostics);

        let normalizer = Normalizer::new(self.config.silver_dir(), self.log.clone(), ctx.clone());
        let silver = normalizer.normalize(&bronze.artifact)?;
        diagnostics.merge(silver.diagnostics);

        let aggregator = Aggregator::new(
            Box::new(VersionedTable::new(self.config.gold_table_root())),
            self.config.gold_fallback_path(),
            self.log.clone(),
            ctx.clone(),
        );
        let gold = aggregator.aggregate(&silver.artifact)?;
        diagnostics.merge(gold.diagnostics);

        let gate = QualityGate::new(self.log.clone(), self.alerts.clone());
        let dq = gate
            .evaluate(
                &silver.artifact,
                &self.config.recipients,
                &self.thresholds,
                self.fail_on_error,
            )
            .await?;
        diagnostics.merge(dq.diagnostics);

        // A fail verdict is fatal to the run; warn and ok pass through.
        if dq.artifact.status == GateStatus::Fail {
            return Err(PipelineError::QualityGateFailed {
                issues: dq.artifact.issues,
            });
        }

        info!(
            run_id = %ctx.run_id,
            dataset = %silver.artifact,
            gold_path = %gold.artifact.display(),
            verdict = ?dq.artifact.status,
            soft_failures = diagnostics.soft_failures.len(),
            "pipeline run finished"
        );

        Ok(RunReport {
            raw_snapshot: bronze.artifact,
            dataset: silver.artifact,
            gold_path: gold.artifact,
            verdict: dq.artifact,
            diagnostics,
        })
    }
}
