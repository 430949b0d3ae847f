// src/types.rs
use serde::{Deserialize, Serialize};

/// One record as received from the source: an opaque field -> value mapping.
/// The producer guarantees no schema; missing fields are the norm.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Expected schema of a directory entry. Fields absent from a raw record are
/// materialized as nulls during normalization.
pub const EXPECTED_FIELDS: [&str; 6] = ["id", "name", "category", "locality", "region", "link"];

/// The partition-key column of the normalized dataset.
pub const PARTITION_FIELD: &str = "region";

/// Sentinel for an empty or missing partition key after normalization.
pub const UNKNOWN_REGION: &str = "UNKNOWN";

/// Fixed-schema record produced by the silver stage. Everything is nullable
/// except `region`, which is always a non-empty uppercase string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub locality: Option<String>,
    pub region: String,
    pub link: Option<String>,
}

/// One grouped row of the gold aggregate. `category` is already sanitized
/// for storage (nulls carry the absence marker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub run_date: String,
    pub region: String,
    pub category: String,
    pub count: u64,
}

/// Soft failures collected while a stage runs. A note here means something
/// non-critical went wrong (metrics append, alert delivery, incremental
/// table write) and the stage kept going.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    pub soft_failures: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::warn!(soft_failure = %msg, "non-fatal pipeline failure");
        self.soft_failures.push(msg);
    }

    pub fn is_clean(&self) -> bool {
        self.soft_failures.is_empty()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.soft_failures.extend(other.soft_failures);
    }
}

/// A stage's primary artifact plus its soft-failure side-channel. The
/// artifact is the only thing whose absence is ever surfaced as an error.
#[derive(Debug)]
pub struct StageOutcome<T> {
    pub artifact: T,
    pub diagnostics: Diagnostics,
}

impl<T> StageOutcome<T> {
    pub fn new(artifact: T, diagnostics: Diagnostics) -> Self {
        Self {
            artifact,
            diagnostics,
        }
    }

    pub fn clean(artifact: T) -> Self {
        Self {
            artifact,
            diagnostics: Diagnostics::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_collects_notes_in_order() {
        let mut d = Diagnostics::new();
        assert!(d.is_clean());
        d.note("first");
        d.note("second");
        assert_eq!(d.soft_failures, vec!["first", "second"]);
    }

    #[test]
    fn merge_preserves_both_sides() {
        let mut a = Diagnostics::new();
        a.note("a1");
        let mut b = Diagnostics::new();
        b.note("b1");
        a.merge(b);
        assert_eq!(a.soft_failures, vec!["a1", "b1"]);
    }
}
