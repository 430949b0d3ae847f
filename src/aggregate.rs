// src/aggregate.rs
//! Gold stage: group the normalized dataset by (region, category), count,
//! stamp with the run date, and write into the versioned table. If the
//! incremental write fails the aggregate is still persisted as a plain
//! snapshot at a fixed fallback location; only losing both paths is fatal.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde_json::{json, Map};
use tracing::{info, warn};

use crate::artifact::{utc_run_date, DatasetId};
use crate::dataset;
use crate::error::PipelineError;
use crate::metrics_log::{MetricsEvent, MetricsLog, RunContext, Stage};
use crate::table::{write_aggregate_rows, TableEngine};
use crate::types::{AggregateRow, Diagnostics, NormalizedRecord, StageOutcome};

/// Storage marker for a null category; grouped rows never carry a null.
pub const ABSENT_CATEGORY: &str = "(none)";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregate_rows_total", "Aggregate rows written.");
        describe_counter!(
            "aggregate_fallback_writes_total",
            "Runs that fell back to the plain snapshot path."
        );
    });
}

pub struct Aggregator {
    engine: Box<dyn TableEngine>,
    fallback_path: PathBuf,
    log: Arc<dyn MetricsLog>,
    ctx: RunContext,
}

impl Aggregator {
    pub fn new(
        engine: Box<dyn TableEngine>,
        fallback_path: impl Into<PathBuf>,
        log: Arc<dyn MetricsLog>,
        ctx: RunContext,
    ) -> Self {
        Self {
            engine,
            fallback_path: fallback_path.into(),
            log,
            ctx,
        }
    }

    /// Aggregate one normalized dataset into the table, returning the path
    /// the aggregate actually landed at (table root or fallback).
    pub fn aggregate(&self, dataset: &DatasetId) -> Result<StageOutcome<PathBuf>, PipelineError> {
        ensure_metrics_described();
        let mut diag = Diagnostics::new();

        let records = dataset::read_dataset(dataset.path())?;
        let run_date = utc_run_date();
        let rows = aggregate_records(&records, &run_date);
        let total_count: u64 = rows.iter().map(|r| r.count).sum();

        let out_path = match self.engine.write(&run_date, &rows) {
            Ok(root) => {
                info!(table = %root.display(), agg_rows = rows.len(), "gold table write committed");
                root
            }
            Err(e) => {
                // Recoverable: keep the aggregate, lose the versioning.
                counter!("aggregate_fallback_writes_total").increment(1);
                warn!(error = %format!("{e:#}"), "incremental table write failed, using fallback path");
                diag.note(format!("incremental table write failed: {e:#}"));
                write_aggregate_rows(&self.fallback_path, &rows)
                    .context("writing fallback aggregate snapshot")?;
                self.fallback_path.clone()
            }
        };
        counter!("aggregate_rows_total").increment(rows.len() as u64);

        let mut metrics = Map::new();
        metrics.insert("agg_rows".into(), json!(rows.len()));
        metrics.insert("total_count".into(), json!(total_count));
        metrics.insert("gold_path".into(), json!(out_path.display().to_string()));
        let event = MetricsEvent::new(Stage::Gold, &self.ctx, "gold", metrics);
        if let Err(e) = self.log.append(&event) {
            diag.note(format!("gold metrics append failed: {e:#}"));
        }

        Ok(StageOutcome::new(out_path, diag))
    }
}

/// Group records by (region, category) and count members, one row per group.
/// Rows are sorted by region ascending, then count descending, then category
/// ascending so equal counts order deterministically.
pub fn aggregate_records(records: &[NormalizedRecord], run_date: &str) -> Vec<AggregateRow> {
    let mut groups: BTreeMap<(String, String), u64> = BTreeMap::new();
    for rec in records {
        let category = rec
            .category
            .clone()
            .unwrap_or_else(|| ABSENT_CATEGORY.to_string());
        *groups.entry((rec.region.clone(), category)).or_insert(0) += 1;
    }

    let mut rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|((region, category), count)| AggregateRow {
            run_date: run_date.to_string(),
            region,
            category,
            count,
        })
        .collect();
    rows.sort_by(|a, b| {
        a.region
            .cmp(&b.region)
            .then(b.count.cmp(&a.count))
            .then(a.category.cmp(&b.category))
    });
    rows
}
