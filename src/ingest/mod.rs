// src/ingest/mod.rs
pub mod pubmed;

use async_trait::async_trait;
use metrics::counter;

use crate::article::{build_article, Article, RawArticle};
use crate::config::SpecialtyConfig;
use crate::error::FetchError;

/// Source of raw article records for one specialty.
///
/// Implementations scope results to the specialty's journals and the lookback window
/// themselves, and enforce their own timeouts.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        cfg: &SpecialtyConfig,
        lookback_days: u32,
        max_count: usize,
    ) -> Result<Vec<RawArticle>, FetchError>;

    fn name(&self) -> &'static str;
}

/// Build articles from raw records, dropping (and logging) records without an identifier.
/// Duplicate identifiers within one fetch keep their first occurrence.
pub fn build_all(raw: &[RawArticle], specialty: &str) -> Vec<Article> {
    let mut ids = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for r in raw {
        match build_article(r, specialty) {
            Ok(a) => {
                if ids.insert(a.id.clone()) {
                    out.push(a);
                } else {
                    tracing::debug!(target: "ingest", pmid = %a.id, "duplicate record in fetch");
                }
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, title = %r.title, "record skipped");
                counter!("digest_records_skipped_total", "specialty" => specialty.to_string())
                    .increment(1);
            }
        }
    }
    out
}
