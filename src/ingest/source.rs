// src/ingest/source.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::types::RawRecord;

/// One candidate source endpoint for the paginated directory.
///
/// `probe` is a minimal connectivity check used during endpoint discovery;
/// `fetch_page` is the real paginated fetch. Implementations other than HTTP
/// exist only in tests, which stub this trait.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    fn name(&self) -> &str;
    async fn probe(&self) -> Result<()>;
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<RawRecord>>;
}

/// HTTP GET against a base URL with `page`/`per_page` query parameters.
/// The response body is a JSON array of record objects; an empty array means
/// end of data.
pub struct HttpDirectorySource {
    base_url: String,
    client: reqwest::Client,
    probe_timeout: Duration,
    fetch_timeout: Duration,
}

impl HttpDirectorySource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            probe_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl DirectorySource for HttpDirectorySource {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self) -> Result<()> {
        // Any transport-level response adopts the endpoint; status is only
        // checked on real page fetches.
        self.client
            .get(&self.base_url)
            .query(&[("page", "1"), ("per_page", "1")])
            .timeout(self.probe_timeout)
            .send()
            .await
            .with_context(|| format!("probing {}", self.base_url))?;
        Ok(())
    }

    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<RawRecord>> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("page", page.to_string()), ("per_page", per_page.to_string())])
            .timeout(self.fetch_timeout)
            .send()
            .await
            .with_context(|| format!("fetching page {page} from {}", self.base_url))?
            .error_for_status()
            .with_context(|| format!("page {page} returned non-success status"))?;

        resp.json::<Vec<RawRecord>>()
            .await
            .with_context(|| format!("decoding page {page} body"))
    }
}
