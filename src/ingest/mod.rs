// src/ingest/mod.rs
//! Bronze stage: discover a working directory endpoint, paginate until
//! exhaustion or error, write the raw snapshot, emit a `bronze` metrics
//! event. A page error keeps the partial accumulation; only a total lack of
//! endpoints (or snapshot-write failure) is fatal.

pub mod source;

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::artifact::{utc_stamp, RawSnapshotId};
use crate::error::PipelineError;
use crate::ingest::source::DirectorySource;
use crate::metrics_log::{MetricsEvent, MetricsLog, RunContext, Stage};
use crate::types::{Diagnostics, RawRecord, StageOutcome, EXPECTED_FIELDS};

/// One-time metrics registration (so series show up on a host's exporter).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Records accumulated across ingest runs.");
        describe_counter!("ingest_pages_total", "Non-empty pages fetched.");
        describe_counter!(
            "ingest_page_errors_total",
            "Page fetches that failed and ended pagination early."
        );
        describe_counter!(
            "ingest_probe_failures_total",
            "Candidate endpoints that failed the discovery probe."
        );
    });
}

pub struct Ingestor {
    sources: Vec<Box<dyn DirectorySource>>,
    bronze_dir: PathBuf,
    log: Arc<dyn MetricsLog>,
    ctx: RunContext,
}

impl Ingestor {
    pub fn new(
        sources: Vec<Box<dyn DirectorySource>>,
        bronze_dir: impl Into<PathBuf>,
        log: Arc<dyn MetricsLog>,
        ctx: RunContext,
    ) -> Self {
        Self {
            sources,
            bronze_dir: bronze_dir.into(),
            log,
            ctx,
        }
    }

    /// Try candidates in order; the first to answer the probe is adopted for
    /// the whole run.
    async fn discover(&self) -> Result<&dyn DirectorySource, PipelineError> {
        let mut last_error = String::from("no candidate endpoints configured");
        for candidate in &self.sources {
            match candidate.probe().await {
                Ok(()) => {
                    info!(endpoint = candidate.name(), "directory endpoint adopted");
                    return Ok(candidate.as_ref());
                }
                Err(e) => {
                    warn!(endpoint = candidate.name(), error = %format!("{e:#}"), "endpoint probe failed");
                    counter!("ingest_probe_failures_total").increment(1);
                    last_error = format!("{e:#}");
                }
            }
        }
        Err(PipelineError::EndpointUnavailable {
            tried: self.sources.len(),
            last_error,
        })
    }

    /// Fetch up to `max_pages` pages of `page_size` records and persist them
    /// as one immutable snapshot.
    pub async fn ingest(
        &self,
        page_size: u32,
        max_pages: u32,
    ) -> Result<StageOutcome<RawSnapshotId>, PipelineError> {
        ensure_metrics_described();
        let source = self.discover().await?;
        let mut diag = Diagnostics::new();

        let mut items: Vec<RawRecord> = Vec::new();
        let mut pages_fetched = 0u32;
        for page in 1..=max_pages {
            match source.fetch_page(page, page_size).await {
                Ok(batch) => {
                    if batch.is_empty() {
                        // End of data.
                        break;
                    }
                    pages_fetched += 1;
                    counter!("ingest_pages_total").increment(1);
                    items.extend(batch);
                }
                Err(e) => {
                    // Partial-success policy: keep what we have. Retry is the
                    // orchestrator's job, not this layer's.
                    counter!("ingest_page_errors_total").increment(1);
                    diag.note(format!(
                        "page {page} fetch failed, keeping {} record(s) accumulated so far: {e:#}",
                        items.len()
                    ));
                    break;
                }
            }
        }

        fs::create_dir_all(&self.bronze_dir)
            .with_context(|| format!("creating bronze dir {}", self.bronze_dir.display()))?;
        let path = self
            .bronze_dir
            .join(format!("bronze_directory_{}.json", utc_stamp()));
        let body = serde_json::to_string_pretty(&items).context("encoding raw snapshot")?;
        fs::write(&path, body)
            .with_context(|| format!("writing raw snapshot {}", path.display()))?;
        let snapshot = RawSnapshotId::new(path);

        counter!("ingest_items_total").increment(items.len() as u64);
        info!(
            snapshot = %snapshot,
            item_count = items.len(),
            pages_fetched,
            "bronze snapshot written"
        );

        let mut metrics = Map::new();
        metrics.insert("item_count".into(), json!(items.len()));
        metrics.insert("pages_fetched".into(), json!(pages_fetched));
        metrics.insert("missing_counts".into(), json!(missing_counts(&items)));
        metrics.insert("bronze_path".into(), json!(snapshot.as_str()));
        let event = MetricsEvent::new(Stage::Bronze, &self.ctx, "bronze", metrics);
        if let Err(e) = self.log.append(&event) {
            diag.note(format!("bronze metrics append failed: {e:#}"));
        }

        Ok(StageOutcome::new(snapshot, diag))
    }
}

/// Per-expected-field count of records where the field is absent or null.
/// Only fields with at least one miss appear.
fn missing_counts(items: &[RawRecord]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for item in items {
        for field in EXPECTED_FIELDS {
            let missing = match item.get(field) {
                None | Some(Value::Null) => true,
                Some(_) => false,
            };
            if missing {
                *counts.entry(field.to_string()).or_insert(0) += 1;
            }
        }
    }
    counts
}
