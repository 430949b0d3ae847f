// src/normalize.rs
//! Silver stage: coerce raw records to the fixed six-field schema, normalize
//! the region partition key, and write a dataset partitioned by region.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::artifact::{utc_stamp, DatasetId, RawSnapshotId};
use crate::dataset;
use crate::error::PipelineError;
use crate::metrics_log::{MetricsEvent, MetricsLog, RunContext, Stage};
use crate::types::{
    Diagnostics, NormalizedRecord, RawRecord, StageOutcome, EXPECTED_FIELDS, UNKNOWN_REGION,
};

pub struct Normalizer {
    silver_dir: PathBuf,
    log: Arc<dyn MetricsLog>,
    ctx: RunContext,
}

impl Normalizer {
    pub fn new(silver_dir: impl Into<PathBuf>, log: Arc<dyn MetricsLog>, ctx: RunContext) -> Self {
        Self {
            silver_dir: silver_dir.into(),
            log,
            ctx,
        }
    }

    /// Read the raw snapshot and write a new partitioned dataset artifact.
    pub fn normalize(
        &self,
        raw: &RawSnapshotId,
    ) -> Result<StageOutcome<DatasetId>, PipelineError> {
        let mut diag = Diagnostics::new();

        let content = fs::read_to_string(raw.path())
            .with_context(|| format!("reading raw snapshot {raw}"))?;
        let items: Vec<RawRecord> =
            serde_json::from_str(&content).with_context(|| format!("decoding raw snapshot {raw}"))?;

        let records: Vec<NormalizedRecord> = items.iter().map(normalize_record).collect();

        // Partition by region; BTreeMap keeps partition order stable.
        let mut partitions: BTreeMap<String, Vec<NormalizedRecord>> = BTreeMap::new();
        for rec in records.iter().cloned() {
            partitions.entry(rec.region.clone()).or_default().push(rec);
        }

        let dataset_root = self.silver_dir.join(format!("run_{}", utc_stamp()));
        fs::create_dir_all(&dataset_root)
            .with_context(|| format!("creating dataset root {}", dataset_root.display()))?;
        for (region, recs) in &partitions {
            let dir = dataset_root.join(dataset::partition_dir_name(region));
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating partition dir {}", dir.display()))?;
            dataset::write_partition(&dir.join("part-00000.parquet"), recs)?;
        }
        let dataset_id = DatasetId::new(dataset_root);

        info!(
            dataset = %dataset_id,
            row_count = records.len(),
            distinct_regions = partitions.len(),
            "silver dataset written"
        );

        // The silver event carries the dataset id: it is the correlation key
        // the quality gate scans for.
        let mut metrics = Map::new();
        metrics.insert("row_count".into(), json!(records.len()));
        metrics.insert("distinct_regions".into(), json!(partitions.len()));
        metrics.insert("null_counts".into(), json!(null_counts(&records)));
        metrics.insert("columns".into(), json!(EXPECTED_FIELDS));
        metrics.insert("silver_path".into(), json!(dataset_id.as_str()));
        let event = MetricsEvent::new(Stage::Silver, &self.ctx, "silver", metrics);
        if let Err(e) = self.log.append(&event) {
            diag.note(format!("silver metrics append failed: {e:#}"));
        }

        Ok(StageOutcome::new(dataset_id, diag))
    }
}

/// Coerce one raw record to the fixed schema. Missing fields become nulls;
/// non-string scalars and nested values become their compact JSON text, so
/// everything downstream is storage-safe.
pub fn normalize_record(raw: &RawRecord) -> NormalizedRecord {
    NormalizedRecord {
        id: text_value(raw.get("id")),
        name: text_value(raw.get("name")),
        category: text_value(raw.get("category")),
        locality: text_value(raw.get("locality")),
        region: normalize_region(raw.get("region")),
        link: text_value(raw.get("link")),
    }
}

fn text_value(v: Option<&Value>) -> Option<String> {
    match v {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Trim, uppercase, and fall back to the `UNKNOWN` sentinel. The result is
/// never empty.
fn normalize_region(v: Option<&Value>) -> String {
    let trimmed = text_value(v).unwrap_or_default().trim().to_uppercase();
    if trimmed.is_empty() {
        UNKNOWN_REGION.to_string()
    } else {
        trimmed
    }
}

/// Per-column null counts over the whole dataset. Region is included for
/// shape parity even though it can never be null.
fn null_counts(records: &[NormalizedRecord]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for field in EXPECTED_FIELDS {
        let nulls = records
            .iter()
            .filter(|r| match field {
                "id" => r.id.is_none(),
                "name" => r.name.is_none(),
                "category" => r.category.is_none(),
                "locality" => r.locality.is_none(),
                "region" => false,
                "link" => r.link.is_none(),
                _ => unreachable!("unknown expected field"),
            })
            .count();
        counts.insert(field.to_string(), nulls as u64);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(fields: &[(&str, Value)]) -> RawRecord {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn region_missing_or_whitespace_maps_to_unknown() {
        assert_eq!(normalize_region(None), "UNKNOWN");
        assert_eq!(normalize_region(Some(&Value::Null)), "UNKNOWN");
        assert_eq!(normalize_region(Some(&json!(""))), "UNKNOWN");
        assert_eq!(normalize_region(Some(&json!("   "))), "UNKNOWN");
    }

    #[test]
    fn region_is_trimmed_and_uppercased() {
        assert_eq!(normalize_region(Some(&json!("  texas "))), "TEXAS");
        assert_eq!(normalize_region(Some(&json!("Ca"))), "CA");
    }

    #[test]
    fn missing_fields_become_nulls() {
        let rec = normalize_record(&raw(&[("id", json!("1"))]));
        assert_eq!(rec.id.as_deref(), Some("1"));
        assert_eq!(rec.name, None);
        assert_eq!(rec.link, None);
        assert_eq!(rec.region, "UNKNOWN");
    }

    #[test]
    fn non_string_values_coerce_to_json_text() {
        let rec = normalize_record(&raw(&[
            ("id", json!(42)),
            ("name", json!({"en": "x"})),
            ("region", json!("or")),
        ]));
        assert_eq!(rec.id.as_deref(), Some("42"));
        assert_eq!(rec.name.as_deref(), Some(r#"{"en":"x"}"#));
        assert_eq!(rec.region, "OR");
    }

    #[test]
    fn colliding_sanitized_regions_stay_separate_partitions() {
        let tmp = tempfile::tempdir().unwrap();
        let raw_path = tmp.path().join("raw.json");
        let items = json!([
            { "id": "1", "region": "A/B" },
            { "id": "2", "region": "A_B" },
        ]);
        fs::write(&raw_path, serde_json::to_string(&items).unwrap()).unwrap();

        let log = Arc::new(crate::metrics_log::MemoryMetricsLog::new());
        let ctx = RunContext::mint("medallion_pipeline");
        let normalizer = Normalizer::new(tmp.path().join("silver"), log, ctx);
        let dataset = normalizer
            .normalize(&RawSnapshotId::new(raw_path))
            .unwrap()
            .artifact;

        // Neither region's partition may shadow the other's.
        let back = dataset::read_dataset(dataset.path()).unwrap();
        assert_eq!(back.len(), 2);
        let regions: Vec<&str> = back.iter().map(|r| r.region.as_str()).collect();
        assert!(regions.contains(&"A/B"));
        assert!(regions.contains(&"A_B"));
    }

    #[test]
    fn null_counts_covers_every_column() {
        let records = vec![
            normalize_record(&raw(&[("id", json!("1")), ("region", json!("tx"))])),
            normalize_record(&raw(&[("name", json!("n"))])),
        ];
        let counts = null_counts(&records);
        assert_eq!(counts.len(), EXPECTED_FIELDS.len());
        assert_eq!(counts["id"], 1);
        assert_eq!(counts["region"], 0);
        assert_eq!(counts["link"], 2);
    }
}
