// src/error.rs
// Fatal error taxonomy for stage primary outputs. Soft failures (metrics
// appends, alert delivery) never travel through this type; they go into the
// `Diagnostics` side-channel instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No candidate endpoint answered the discovery probe. There is nothing
    /// to ingest and no raw artifact to write.
    #[error("no usable directory endpoint after trying {tried} candidate(s): {last_error}")]
    EndpointUnavailable { tried: usize, last_error: String },

    /// Threshold or correlation failure escalated by `fail_on_error`.
    #[error("quality gate failed: {}", issues.join("; "))]
    QualityGateFailed { issues: Vec<String> },

    /// Anything else fatal to a stage's primary artifact (I/O, encoding).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
