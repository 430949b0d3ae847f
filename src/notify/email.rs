// src/notify/email.rs
use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::AlertSink;

/// SMTP alert sink configured from the environment:
/// `ALERT_SMTP_HOST` (required), `ALERT_SMTP_USER`/`ALERT_SMTP_PASSWORD`
/// (optional pair), `ALERT_SMTP_FROM` (optional).
pub struct EmailAlertSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailAlertSink {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("ALERT_SMTP_HOST").context("ALERT_SMTP_HOST missing")?;
        let from_addr = std::env::var("ALERT_SMTP_FROM")
            .unwrap_or_else(|_| "medallion-pipeline@example.com".to_string());

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid ALERT_SMTP_HOST")?;
        if let (Ok(user), Ok(pass)) = (
            std::env::var("ALERT_SMTP_USER"),
            std::env::var("ALERT_SMTP_PASSWORD"),
        ) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        let from = from_addr.parse().context("invalid ALERT_SMTP_FROM")?;
        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

#[async_trait::async_trait]
impl AlertSink for EmailAlertSink {
    async fn send(&self, recipients: &[String], subject: &str, html_body: &str) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_HTML);
        for to in recipients {
            let mailbox: Mailbox = to
                .parse()
                .with_context(|| format!("invalid recipient address {to}"))?;
            builder = builder.to(mailbox);
        }
        let msg = builder
            .body(html_body.to_string())
            .context("build alert email")?;

        self.mailer.send(msg).await.context("send alert email")?;
        Ok(())
    }
}
