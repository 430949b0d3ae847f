// src/bin/run_pipeline.rs
// One-shot pipeline run. Scheduling and retries belong to whatever invokes
// this (cron, an orchestrator task, a shell).

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medallion_pipeline::notify::email::EmailAlertSink;
use medallion_pipeline::notify::AlertSink;
use medallion_pipeline::{Pipeline, PipelineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PipelineConfig::load_default()?;

    // Alerts only when SMTP is configured; the gate degrades gracefully
    // without a sink.
    let alerts: Option<Arc<dyn AlertSink>> = if std::env::var("ALERT_SMTP_HOST").is_ok() {
        match EmailAlertSink::from_env() {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "SMTP alert sink unavailable");
                None
            }
        }
    } else {
        None
    };

    let report = Pipeline::from_config(config, alerts).run_once().await?;

    info!(
        raw_snapshot = %report.raw_snapshot,
        dataset = %report.dataset,
        gold_path = %report.gold_path.display(),
        verdict = ?report.verdict.status,
        "run complete"
    );
    for issue in &report.verdict.issues {
        warn!(issue, "data-quality issue");
    }
    for soft in &report.diagnostics.soft_failures {
        warn!(soft_failure = soft, "non-fatal failure during run");
    }
    Ok(())
}
