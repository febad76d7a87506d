// src/notify/preview.rs
//! Dry-run deliverer: writes the rendered HTML to disk and sends nothing.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;

use super::{render_email, uniform_report, Deliverer, DeliveryReport};
use crate::config::SpecialtyConfig;
use crate::digest::DigestBatch;
use crate::error::DeliveryError;

pub struct PreviewDeliverer {
    output_dir: PathBuf,
}

impl PreviewDeliverer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, slug: &str) -> PathBuf {
        self.output_dir.join(format!("{slug}_email_preview.html"))
    }

    fn write(&self, slug: &str, html: &str) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("create {}", self.output_dir.display()))?;
        let path = self.path_for(slug);
        std::fs::write(&path, html).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl Deliverer for PreviewDeliverer {
    async fn deliver(
        &self,
        batch: &DigestBatch,
        cfg: &SpecialtyConfig,
    ) -> Result<DeliveryReport, DeliveryError> {
        let email = render_email(batch, cfg, Utc::now());
        let path = self
            .write(&cfg.slug, &email.html)
            .map_err(|e| DeliveryError::Transport(format!("{e:#}")))?;
        tracing::info!(
            target: "notify",
            specialty = %cfg.slug,
            path = %path.display(),
            articles = batch.len(),
            "dry run: preview written, nothing sent"
        );
        // Nothing left the machine, so nothing becomes sent.
        Ok(uniform_report(batch, false))
    }

    fn name(&self) -> &'static str {
        "preview"
    }
}
