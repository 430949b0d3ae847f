// src/artifact.rs
// Artifact identities are timestamp-derived paths: a new invocation mints a
// new identity, and nothing is ever mutated after write. Re-running a failed
// stage therefore produces a *different* artifact, not a convergent one.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;

/// UTC stamp used in artifact names and run ids, e.g.
/// `20250829T101530.123456Z`. Microsecond resolution matches the metrics-log
/// event ids, so concurrent invocations mint distinct identities.
pub fn utc_stamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string()
}

/// Current run date, `YYYY-MM-DD` (UTC).
pub fn utc_run_date() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

macro_rules! path_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(PathBuf);

        impl $name {
            pub fn new(path: impl Into<PathBuf>) -> Self {
                Self(path.into())
            }

            pub fn path(&self) -> &Path {
                &self.0
            }

            /// String form used in metrics payloads and correlation keys.
            pub fn as_str(&self) -> String {
                self.0.display().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.display().fmt(f)
            }
        }
    };
}

path_id! {
    /// Identity of one raw snapshot: the timestamped JSON file the bronze
    /// stage wrote.
    RawSnapshotId
}

path_id! {
    /// Identity of one normalized dataset: the `run_<stamp>` directory root
    /// the silver stage wrote. This is the correlation key the quality gate
    /// looks up in the metrics log.
    DatasetId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_has_compact_utc_shape_with_microseconds() {
        let s = utc_stamp();
        assert_eq!(s.len(), 23);
        assert!(s.ends_with('Z'));
        assert_eq!(&s[8..9], "T");
        assert_eq!(&s[15..16], ".");
        assert!(s[16..22].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn run_date_is_iso_day() {
        let d = utc_run_date();
        assert_eq!(d.len(), 10);
        assert_eq!(&d[4..5], "-");
        assert_eq!(&d[7..8], "-");
    }

    #[test]
    fn dataset_id_round_trips_path() {
        let id = DatasetId::new("/tmp/silver/run_x");
        assert_eq!(id.path(), Path::new("/tmp/silver/run_x"));
        assert_eq!(id.as_str(), "/tmp/silver/run_x");
    }
}
