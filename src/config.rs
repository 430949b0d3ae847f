// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "MEDALLION_CONFIG_PATH";

/// Pipeline configuration. Every field has a default so the pipeline can run
/// with no config file at all; a TOML file overrides field by field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root under which bronze/silver/gold/logging live.
    pub data_root: PathBuf,
    /// Ordered candidate base endpoints, tried first-success-wins.
    pub endpoints: Vec<String>,
    /// Records requested per page.
    pub page_size: u32,
    /// Upper bound on pages fetched per run.
    pub max_pages: u32,
    /// Logical pipeline name stamped into every metrics event.
    pub dag_id: String,
    /// Default alert recipients for the quality gate.
    pub recipients: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            endpoints: vec![
                "https://api.openbrewerydb.org/v1/breweries".to_string(),
                "https://api.openbrewerydb.org/breweries".to_string(),
            ],
            page_size: 50,
            max_pages: 5,
            dag_id: "medallion_pipeline".to_string(),
            recipients: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from an explicit TOML path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let cfg: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $MEDALLION_CONFIG_PATH
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("MEDALLION_CONFIG_PATH points to non-existent path"));
            }
        }
        let fallback = PathBuf::from("config/pipeline.toml");
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        Ok(Self::default())
    }

    pub fn bronze_dir(&self) -> PathBuf {
        self.data_root.join("bronze")
    }

    pub fn silver_dir(&self) -> PathBuf {
        self.data_root.join("silver")
    }

    pub fn gold_table_root(&self) -> PathBuf {
        self.data_root.join("gold").join("table")
    }

    /// Fixed, non-versioned location used when the incremental table write
    /// fails. Distinct from the table root.
    pub fn gold_fallback_path(&self) -> PathBuf {
        self.data_root.join("gold").join("fallback").join("aggregate.parquet")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_root.join("logging")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn defaults_are_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.max_pages, 5);
        assert_eq!(cfg.endpoints.len(), 2);
        assert!(cfg.recipients.is_empty());
        assert_eq!(cfg.log_dir(), PathBuf::from("data/logging"));
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let toml = r#"
            data_root = "/var/pipeline"
            max_pages = 9
        "#;
        let cfg: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.data_root, PathBuf::from("/var/pipeline"));
        assert_eq!(cfg.max_pages, 9);
        // untouched fields keep their defaults
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.dag_id, "medallion_pipeline");
    }

    #[serial_test::serial]
    #[test]
    fn load_default_prefers_env_path() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("pipeline.toml");
        std::fs::write(&p, r#"dag_id = "from_env""#).unwrap();

        env::set_var(ENV_PATH, p.display().to_string());
        let cfg = PipelineConfig::load_default().unwrap();
        assert_eq!(cfg.dag_id, "from_env");
        env::remove_var(ENV_PATH);
    }

    #[serial_test::serial]
    #[test]
    fn load_default_errors_on_dangling_env_path() {
        env::set_var(ENV_PATH, "/definitely/not/here.toml");
        assert!(PipelineConfig::load_default().is_err());
        env::remove_var(ENV_PATH);
    }
}
