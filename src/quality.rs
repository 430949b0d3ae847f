// src/quality.rs
//! Quality gate: recover a dataset's silver metrics from the event log,
//! evaluate threshold rules, and classify the dataset ok/warn/fail. The
//! verdict is ephemeral; persistence, if any, belongs to the caller.

use std::sync::Arc;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::artifact::DatasetId;
use crate::error::PipelineError;
use crate::metrics_log::{MetricsLog, Stage};
use crate::notify::AlertSink;
use crate::types::{Diagnostics, StageOutcome};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("dq_issues_total", "Threshold rule violations found.");
        describe_counter!("dq_alerts_sent_total", "Quality alerts delivered.");
    });
}

/// Rule thresholds, all overridable per invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum acceptable row count.
    pub min_rows: u64,
    /// Maximum tolerated fraction of rows with a missing link.
    pub max_missing_link_pct: f64,
    /// Minimum distinct partition-key cardinality.
    pub min_regions: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_rows: 50,
            max_missing_link_pct: 0.2,
            min_regions: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub status: GateStatus,
    pub issues: Vec<String>,
}

impl QualityVerdict {
    pub fn ok() -> Self {
        Self {
            status: GateStatus::Ok,
            issues: Vec::new(),
        }
    }

    pub fn warn(issues: Vec<String>) -> Self {
        Self {
            status: GateStatus::Warn,
            issues,
        }
    }

    pub fn fail(issues: Vec<String>) -> Self {
        Self {
            status: GateStatus::Fail,
            issues,
        }
    }
}

pub struct QualityGate {
    log: Arc<dyn MetricsLog>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl QualityGate {
    pub fn new(log: Arc<dyn MetricsLog>, alerts: Option<Arc<dyn AlertSink>>) -> Self {
        Self { log, alerts }
    }

    /// Evaluate threshold rules for the given normalized dataset.
    ///
    /// With `fail_on_error` unset, rule violations (and a missing correlation
    /// entry) yield a `warn` verdict; set, they classify as `fail`, which the
    /// pipeline escalates to `PipelineError::QualityGateFailed`. Alert
    /// delivery failures are always swallowed into diagnostics.
    pub async fn evaluate(
        &self,
        dataset: &DatasetId,
        recipients: &[String],
        thresholds: &Thresholds,
        fail_on_error: bool,
    ) -> Result<StageOutcome<QualityVerdict>, PipelineError> {
        ensure_metrics_described();
        let mut diag = Diagnostics::new();
        let key = dataset.as_str();

        let matches = self.log.scan(&|ev| {
            ev.stage == Stage::Silver && ev.metric_str("silver_path") == Some(key.as_str())
        })?;

        // The dataset is unknown to the log.
        let Some((event_id, event)) = matches.last() else {
            let issue = format!("no metrics found for dataset {dataset}");
            self.send_alert(
                recipients,
                &format!("DQ: missing metrics for {dataset}"),
                &format!("<p>{issue}</p>"),
                &mut diag,
            )
            .await;
            let verdict = if fail_on_error {
                QualityVerdict::fail(vec![issue])
            } else {
                QualityVerdict::warn(vec![issue])
            };
            return Ok(StageOutcome::new(verdict, diag));
        };
        info!(dataset = %dataset, event_id = %event_id, "correlated silver metrics");

        let issues = evaluate_rules(&event.metrics, thresholds);
        if issues.is_empty() {
            return Ok(StageOutcome::new(QualityVerdict::ok(), diag));
        }
        counter!("dq_issues_total").increment(issues.len() as u64);

        let (subject, html) = alert_body(dataset, &issues, &event.metrics);
        self.send_alert(recipients, &subject, &html, &mut diag).await;

        let verdict = if fail_on_error {
            QualityVerdict::fail(issues)
        } else {
            QualityVerdict::warn(issues)
        };
        Ok(StageOutcome::new(verdict, diag))
    }

    async fn send_alert(
        &self,
        recipients: &[String],
        subject: &str,
        html: &str,
        diag: &mut Diagnostics,
    ) {
        if recipients.is_empty() {
            return;
        }
        let Some(sink) = &self.alerts else {
            diag.note("alert requested but no alert sink configured");
            return;
        };
        match sink.send(recipients, subject, html).await {
            Ok(()) => {
                counter!("dq_alerts_sent_total").increment(1);
            }
            Err(e) => diag.note(format!("alert delivery failed: {e:#}")),
        }
    }
}

/// Apply the threshold rules in order. An empty dataset short-circuits: no
/// other rule fires on zero rows.
pub fn evaluate_rules(metrics: &Map<String, Value>, thresholds: &Thresholds) -> Vec<String> {
    let row_count = metrics.get("row_count").and_then(Value::as_u64).unwrap_or(0);
    if row_count == 0 {
        return vec!["silver dataset is empty (row_count=0)".to_string()];
    }

    let mut issues = Vec::new();
    if row_count < thresholds.min_rows {
        issues.push(format!(
            "row_count {row_count} below min_rows {}",
            thresholds.min_rows
        ));
    }

    let missing_link = metrics
        .get("null_counts")
        .and_then(|v| v.get("link"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let missing_pct = missing_link as f64 / row_count as f64;
    if missing_pct > thresholds.max_missing_link_pct {
        issues.push(format!(
            "link missing {:.1}% > {:.1}%",
            missing_pct * 100.0,
            thresholds.max_missing_link_pct * 100.0
        ));
    }

    let distinct_regions = metrics
        .get("distinct_regions")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if distinct_regions < thresholds.min_regions {
        issues.push(format!(
            "distinct_regions {distinct_regions} below min_regions {}",
            thresholds.min_regions
        ));
    }

    issues
}

fn alert_body(
    dataset: &DatasetId,
    issues: &[String],
    metrics: &Map<String, Value>,
) -> (String, String) {
    let subject = format!("DQ alert: {} issue(s) for {dataset}", issues.len());
    let mut html = format!(
        "<p>Found {} data-quality issue(s) for <b>{dataset}</b></p><ul>",
        issues.len()
    );
    for issue in issues {
        html.push_str(&format!("<li>{issue}</li>"));
    }
    html.push_str("</ul>");
    html.push_str(&format!(
        "<pre>{}</pre>",
        serde_json::to_string_pretty(&metrics).unwrap_or_default()
    ));
    (subject, html)
}
