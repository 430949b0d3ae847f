// src/table.rs
//! Versioned, append-capable gold table. Layout:
//!
//! ```text
//! <root>/_version_log/<version>.json        commit records (monotonic)
//! <root>/run_date=<d>/part-<version>.parquet  data, one file per commit
//! ```
//!
//! The first commit runs in overwrite mode (it creates the table); every
//! later commit appends a new partition-version. Nothing is ever deleted or
//! rewritten. Commit files are created with `create_new`, so a concurrent
//! run racing for the same version surfaces as an error instead of a silent
//! overwrite.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow::array::{ArrayRef, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde_json::json;

use crate::types::AggregateRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    Append,
}

impl WriteMode {
    fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Overwrite => "overwrite",
            WriteMode::Append => "append",
        }
    }
}

/// Storage seam for the gold stage. The aggregator only needs "write these
/// rows for this run date somewhere durable"; tests inject failing engines.
pub trait TableEngine: Send + Sync {
    fn write(&self, run_date: &str, rows: &[AggregateRow]) -> Result<PathBuf>;
}

pub struct VersionedTable {
    root: PathBuf,
}

impl VersionedTable {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_log_dir(&self) -> PathBuf {
        self.root.join("_version_log")
    }

    /// Committed versions, ascending. Empty for a table never written to.
    pub fn versions(&self) -> Result<Vec<u64>> {
        let dir = self.version_log_dir();
        let mut versions = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => return Ok(versions),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(v) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

impl TableEngine for VersionedTable {
    fn write(&self, run_date: &str, rows: &[AggregateRow]) -> Result<PathBuf> {
        let log_dir = self.version_log_dir();
        let (mode, version) = if log_dir.is_dir() {
            let next = self.versions()?.last().map(|v| v + 1).unwrap_or(0);
            (WriteMode::Append, next)
        } else {
            (WriteMode::Overwrite, 0)
        };

        // Data first, commit second: an uncommitted data file is invisible.
        let partition_dir = self.root.join(format!("run_date={run_date}"));
        fs::create_dir_all(&partition_dir)
            .with_context(|| format!("creating table partition {}", partition_dir.display()))?;
        let data_path = partition_dir.join(format!("part-{version:05}.parquet"));
        write_aggregate_rows(&data_path, rows)?;

        fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating version log {}", log_dir.display()))?;
        let commit_path = log_dir.join(format!("{version:020}.json"));
        let commit = json!({
            "version": version,
            "mode": mode.as_str(),
            "run_date": run_date,
            "row_count": rows.len(),
            "ts": Utc::now().to_rfc3339(),
        });
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&commit_path)
            .with_context(|| format!("committing table version {version}"))?;
        file.write_all(serde_json::to_string_pretty(&commit)?.as_bytes())
            .with_context(|| format!("writing commit {}", commit_path.display()))?;

        Ok(self.root.clone())
    }
}

fn aggregate_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("run_date", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("count", DataType::UInt64, false),
    ]))
}

/// Write aggregate rows as one parquet file. Shared by the versioned engine
/// and the plain fallback snapshot.
pub fn write_aggregate_rows(path: &Path, rows: &[AggregateRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let schema = aggregate_schema();
    let run_dates = StringArray::from_iter_values(rows.iter().map(|r| r.run_date.as_str()));
    let regions = StringArray::from_iter_values(rows.iter().map(|r| r.region.as_str()));
    let categories = StringArray::from_iter_values(rows.iter().map(|r| r.category.as_str()));
    let counts = UInt64Array::from_iter_values(rows.iter().map(|r| r.count));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(run_dates),
        Arc::new(regions),
        Arc::new(categories),
        Arc::new(counts),
    ];
    let batch =
        RecordBatch::try_new(schema.clone(), columns).context("building aggregate batch")?;

    let file = File::create(path)
        .with_context(|| format!("creating aggregate file {}", path.display()))?;
    let mut writer =
        ArrowWriter::try_new(file, schema, None).context("opening aggregate writer")?;
    writer.write(&batch).context("writing aggregate batch")?;
    writer.close().context("closing aggregate writer")?;
    Ok(())
}

/// Read one aggregate parquet file back. Used by tests and table consumers.
pub fn read_aggregate_rows(path: &Path) -> Result<Vec<AggregateRow>> {
    let file = File::open(path)
        .with_context(|| format!("opening aggregate file {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("opening aggregate reader")?
        .build()
        .context("building aggregate reader")?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.context("decoding aggregate batch")?;
        let run_date = utf8_col(&batch, "run_date")?;
        let region = utf8_col(&batch, "region")?;
        let category = utf8_col(&batch, "category")?;
        let count = batch
            .column_by_name("count")
            .ok_or_else(|| anyhow!("aggregate column 'count' missing"))?
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| anyhow!("aggregate column 'count' is not UInt64"))?;

        for i in 0..batch.num_rows() {
            rows.push(AggregateRow {
                run_date: run_date.value(i).to_string(),
                region: region.value(i).to_string(),
                category: category.value(i).to_string(),
                count: count.value(i),
            });
        }
    }
    Ok(rows)
}

fn utf8_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("aggregate column '{name}' missing"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("aggregate column '{name}' is not Utf8"))
}
