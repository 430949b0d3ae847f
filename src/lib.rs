// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod aggregate;
pub mod artifact;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod metrics_log;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod quality;
pub mod table;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::artifact::{DatasetId, RawSnapshotId};
pub use crate::config::PipelineConfig;
pub use crate::error::PipelineError;
pub use crate::metrics_log::{
    EventId, FileMetricsLog, MemoryMetricsLog, MetricsEvent, MetricsLog, RunContext, Stage,
};
pub use crate::pipeline::{Pipeline, RunReport};
pub use crate::quality::{GateStatus, QualityGate, QualityVerdict, Thresholds};
pub use crate::types::{Diagnostics, NormalizedRecord, RawRecord, StageOutcome};
