// src/metrics_log.rs
//! Append-only event store shared by every stage. One event per stage
//! invocation, immutable once written, identity encodes stage + generation
//! time so concurrent runs never need coordination.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Bronze,
    Silver,
    Gold,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Bronze => "bronze",
            Stage::Silver => "silver",
            Stage::Gold => "gold",
        }
    }
}

/// Identity of a run, stamped into every event it emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub dag_id: String,
    pub run_id: String,
}

impl RunContext {
    /// Mint a fresh run id from the wall clock. Centralized so a
    /// caller-supplied id could replace the stamp without touching stages.
    pub fn mint(dag_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            run_id: format!("run_{}", crate::artifact::utc_stamp()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub ts: DateTime<Utc>,
    pub stage: Stage,
    pub dag_id: String,
    pub run_id: String,
    pub task_id: String,
    pub metrics: Map<String, Value>,
}

impl MetricsEvent {
    pub fn new(
        stage: Stage,
        ctx: &RunContext,
        task_id: impl Into<String>,
        metrics: Map<String, Value>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            stage,
            dag_id: ctx.dag_id.clone(),
            run_id: ctx.run_id.clone(),
            task_id: task_id.into(),
            metrics,
        }
    }

    /// Convenience accessor for a string metric (e.g. the correlation key).
    pub fn metric_str(&self, key: &str) -> Option<&str> {
        self.metrics.get(key).and_then(Value::as_str)
    }
}

pub type EventId = String;

/// Append-only event store. `scan` is a linear pass filtering by predicate;
/// fine at expected volumes, and the contract leaves room for an indexed
/// implementation later. Results come back ordered by event id ascending, so
/// the last element is the most recently logged match.
pub trait MetricsLog: Send + Sync {
    fn append(&self, event: &MetricsEvent) -> Result<EventId>;
    fn scan(&self, predicate: &dyn Fn(&MetricsEvent) -> bool)
        -> Result<Vec<(EventId, MetricsEvent)>>;
}

/// One JSON file per event under a shared directory. Filenames carry a
/// microsecond component so two events in the same second (concurrent runs
/// included) still get distinct ids that sort by generation time.
pub struct FileMetricsLog {
    dir: PathBuf,
}

impl FileMetricsLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn event_id(event: &MetricsEvent) -> EventId {
        format!(
            "log_{}_{:06}_{}.json",
            event.ts.format("%Y%m%dT%H%M%S"),
            event.ts.timestamp_subsec_micros(),
            event.stage.as_str()
        )
    }
}

impl MetricsLog for FileMetricsLog {
    fn append(&self, event: &MetricsEvent) -> Result<EventId> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating log dir {}", self.dir.display()))?;
        let id = Self::event_id(event);
        let path = self.dir.join(&id);
        let body = serde_json::to_string_pretty(event).context("encoding metrics event")?;
        fs::write(&path, body)
            .with_context(|| format!("writing metrics event {}", path.display()))?;
        Ok(id)
    }

    fn scan(
        &self,
        predicate: &dyn Fn(&MetricsEvent) -> bool,
    ) -> Result<Vec<(EventId, MetricsEvent)>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            // A log that was never written to is just empty.
            Err(_) => return Ok(out),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            // Skip unparsable files rather than failing the scan.
            let Ok(event) = serde_json::from_str::<MetricsEvent>(&content) else {
                continue;
            };
            if predicate(&event) {
                let id = entry.file_name().to_string_lossy().to_string();
                out.push((id, event));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

/// In-memory implementation with the same contract. Used by tests and handy
/// for embedding without a shared directory.
#[derive(Default)]
pub struct MemoryMetricsLog {
    inner: Mutex<Vec<(EventId, MetricsEvent)>>,
}

impl MemoryMetricsLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsLog for MemoryMetricsLog {
    fn append(&self, event: &MetricsEvent) -> Result<EventId> {
        let mut inner = self.inner.lock().expect("metrics log mutex poisoned");
        // Sequence suffix keeps ids unique and ordered even within one microsecond.
        let id = format!(
            "log_{}_{:06}_{:04}_{}.json",
            event.ts.format("%Y%m%dT%H%M%S"),
            event.ts.timestamp_subsec_micros(),
            inner.len(),
            event.stage.as_str()
        );
        inner.push((id.clone(), event.clone()));
        Ok(id)
    }

    fn scan(
        &self,
        predicate: &dyn Fn(&MetricsEvent) -> bool,
    ) -> Result<Vec<(EventId, MetricsEvent)>> {
        let inner = self.inner.lock().expect("metrics log mutex poisoned");
        let mut out: Vec<(EventId, MetricsEvent)> = inner
            .iter()
            .filter(|(_, ev)| predicate(ev))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}
