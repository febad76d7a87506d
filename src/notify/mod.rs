// src/notify/mod.rs
//! Delivery collaborator. A deliverer reports, per article, whether the digest reached
//! at least one recipient; only those ids are marked sent.

pub mod email;
pub mod preview;
pub mod render;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::SpecialtyConfig;
use crate::digest::DigestBatch;
use crate::error::DeliveryError;

pub use email::EmailDeliverer;
pub use preview::PreviewDeliverer;
pub use render::{render_email, RenderedEmail};

/// Article id → delivered. Total failure is a `DeliveryError`, never an all-false map.
pub type DeliveryReport = BTreeMap<String, bool>;

#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(
        &self,
        batch: &DigestBatch,
        cfg: &SpecialtyConfig,
    ) -> Result<DeliveryReport, DeliveryError>;

    fn name(&self) -> &'static str;
}

/// Same outcome for every article of the batch, headlines included.
pub fn uniform_report(batch: &DigestBatch, delivered: bool) -> DeliveryReport {
    batch.ids().into_iter().map(|id| (id, delivered)).collect()
}
