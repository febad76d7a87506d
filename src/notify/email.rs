// src/notify/email.rs
//! SMTP delivery via lettre. One message per recipient so each outcome is known;
//! an article counts as delivered when at least one recipient accepted the digest.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{render_email, uniform_report, Deliverer, DeliveryReport, RenderedEmail};
use crate::config::{Settings, SpecialtyConfig};
use crate::digest::DigestBatch;
use crate::error::DeliveryError;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EmailDeliverer<T = AsyncSmtpTransport<Tokio1Executor>> {
    mailer: T,
    from: Mailbox,
    /// Used when a specialty lists no recipients of its own.
    fallback_to: Vec<String>,
}

impl EmailDeliverer {
    /// STARTTLS relay with credentials from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let user = settings
            .smtp_user
            .clone()
            .ok_or_else(|| anyhow!("SMTP_USER missing"))?;
        let pass = settings
            .smtp_pass
            .clone()
            .ok_or_else(|| anyhow!("SMTP_PASS missing"))?;
        let from_addr = settings.email_from.clone().unwrap_or_else(|| user.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
            .with_context(|| format!("invalid SMTP_HOST `{}`", settings.smtp_host))?
            .credentials(Credentials::new(user, pass))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Self::with_transport(mailer, &from_addr, settings.email_to.clone())
    }
}

impl<T> EmailDeliverer<T>
where
    T: AsyncTransport + Send + Sync,
    T::Error: std::fmt::Display,
{
    pub fn with_transport(mailer: T, from: &str, fallback_to: Vec<String>) -> Result<Self> {
        let from: Mailbox = from
            .parse()
            .with_context(|| format!("invalid sender address `{from}`"))?;
        Ok(Self {
            mailer,
            from,
            fallback_to,
        })
    }

    fn recipients<'a>(&'a self, cfg: &'a SpecialtyConfig) -> &'a [String] {
        if cfg.recipients.is_empty() {
            &self.fallback_to
        } else {
            &cfg.recipients
        }
    }

    fn build_message(&self, to: &str, email: &RenderedEmail) -> Result<Message> {
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("invalid recipient `{to}`"))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .context("build email")
    }
}

#[async_trait]
impl<T> Deliverer for EmailDeliverer<T>
where
    T: AsyncTransport + Send + Sync,
    T::Error: std::fmt::Display,
{
    async fn deliver(
        &self,
        batch: &DigestBatch,
        cfg: &SpecialtyConfig,
    ) -> Result<DeliveryReport, DeliveryError> {
        let recipients = self.recipients(cfg);
        if recipients.is_empty() {
            return Err(DeliveryError::NoRecipients(cfg.slug.clone()));
        }

        let email = render_email(batch, cfg, Utc::now());
        let mut delivered = 0usize;
        let mut last_error = String::new();

        // 1) one message per recipient; a bad address only costs that recipient
        for to in recipients {
            let msg = match self.build_message(to, &email) {
                Ok(m) => m,
                Err(e) => {
                    last_error = format!("{e:#}");
                    tracing::warn!(target: "notify", specialty = %cfg.slug, error = %last_error, "skipping recipient");
                    continue;
                }
            };
            match self.mailer.send(msg).await {
                Ok(_) => {
                    delivered += 1;
                    tracing::info!(target: "notify", specialty = %cfg.slug, to = %to, "digest sent");
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(target: "notify", specialty = %cfg.slug, to = %to, error = %last_error, "send failed");
                }
            }
        }

        // 2) all-or-nothing per article: the same batch went to everyone
        if delivered == 0 {
            return Err(DeliveryError::AllRecipientsFailed {
                attempted: recipients.len(),
                last_error,
            });
        }
        Ok(uniform_report(batch, true))
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
