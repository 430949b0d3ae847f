// src/dataset.rs
//! Columnar encoding of the normalized dataset: one parquet file per
//! `region=<VALUE>` partition directory, fixed six-column Utf8 schema.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::types::NormalizedRecord;

pub fn normalized_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, true),
        Field::new("name", DataType::Utf8, true),
        Field::new("category", DataType::Utf8, true),
        Field::new("locality", DataType::Utf8, true),
        Field::new("region", DataType::Utf8, false),
        Field::new("link", DataType::Utf8, true),
    ]))
}

/// Directory name for one partition. Region values are already trimmed and
/// uppercased; path-hostile bytes are percent-encoded, hive-style, so
/// distinct region values always map to distinct directories.
pub fn partition_dir_name(region: &str) -> String {
    let mut safe = String::with_capacity(region.len());
    for b in region.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b' ' | b'-' | b'_' => safe.push(b as char),
            _ => safe.push_str(&format!("%{b:02X}")),
        }
    }
    format!("region={safe}")
}

/// Write one partition's records as a single parquet file.
pub fn write_partition(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    let schema = normalized_schema();

    let ids: StringArray = records.iter().map(|r| r.id.as_deref()).collect();
    let names: StringArray = records.iter().map(|r| r.name.as_deref()).collect();
    let categories: StringArray = records.iter().map(|r| r.category.as_deref()).collect();
    let localities: StringArray = records.iter().map(|r| r.locality.as_deref()).collect();
    let regions = StringArray::from_iter_values(records.iter().map(|r| r.region.as_str()));
    let links: StringArray = records.iter().map(|r| r.link.as_deref()).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids),
        Arc::new(names),
        Arc::new(categories),
        Arc::new(localities),
        Arc::new(regions),
        Arc::new(links),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)
        .context("building normalized record batch")?;

    let file = File::create(path)
        .with_context(|| format!("creating partition file {}", path.display()))?;
    let mut writer =
        ArrowWriter::try_new(file, schema, None).context("opening parquet writer")?;
    writer.write(&batch).context("writing partition batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

/// Read every partition of a dataset back into records. Partitions and files
/// are visited in lexicographic order so the result is deterministic.
pub fn read_dataset(root: &Path) -> Result<Vec<NormalizedRecord>> {
    let mut partition_dirs: Vec<PathBuf> = fs::read_dir(root)
        .with_context(|| format!("reading dataset root {}", root.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("region="))
                    .unwrap_or(false)
        })
        .collect();
    partition_dirs.sort();

    let mut records = Vec::new();
    for dir in partition_dirs {
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("reading partition {}", dir.display()))?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("parquet"))
            .collect();
        files.sort();
        for file in files {
            read_parquet_file(&file, &mut records)?;
        }
    }
    Ok(records)
}

fn read_parquet_file(path: &Path, out: &mut Vec<NormalizedRecord>) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("opening parquet file {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("opening parquet reader")?
        .build()
        .context("building parquet reader")?;

    for batch in reader {
        let batch = batch.context("decoding parquet batch")?;
        let id = string_column(&batch, "id")?;
        let name = string_column(&batch, "name")?;
        let category = string_column(&batch, "category")?;
        let locality = string_column(&batch, "locality")?;
        let region = string_column(&batch, "region")?;
        let link = string_column(&batch, "link")?;

        for i in 0..batch.num_rows() {
            out.push(NormalizedRecord {
                id: opt_value(id, i),
                name: opt_value(name, i),
                category: opt_value(category, i),
                locality: opt_value(locality, i),
                region: region.value(i).to_string(),
                link: opt_value(link, i),
            });
        }
    }
    Ok(())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("dataset column '{name}' missing"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("dataset column '{name}' is not Utf8"))
}

fn opt_value(arr: &StringArray, i: usize) -> Option<String> {
    if arr.is_null(i) {
        None
    } else {
        Some(arr.value(i).to_string())
    }
}
