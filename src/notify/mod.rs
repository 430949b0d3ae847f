// src/notify/mod.rs
pub mod email;

use anyhow::Result;

/// Delivery seam for quality alerts. Recipients are per-call because the
/// quality gate accepts them per invocation; the transport is fixed per sink.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, html_body: &str) -> Result<()>;
}

// --- Test helper ---
#[derive(Debug, Clone)]
pub struct SentAlert {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

/// Records every send; optionally fails each call to exercise the
/// swallow-alert-failures policy.
pub struct MockAlertSink {
    pub calls: std::sync::Mutex<Vec<SentAlert>>,
    pub fail: bool,
}

impl MockAlertSink {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

impl Default for MockAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AlertSink for MockAlertSink {
    async fn send(&self, recipients: &[String], subject: &str, html_body: &str) -> Result<()> {
        self.calls.lock().expect("alert sink mutex poisoned").push(SentAlert {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        if self.fail {
            anyhow::bail!("mock alert sink configured to fail");
        }
        Ok(())
    }
}
