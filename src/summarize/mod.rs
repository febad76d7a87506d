// src/summarize/mod.rs
//! Summarization collaborator: provider abstraction + file cache + offline fallback.

pub mod cache;
pub mod extractive;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::SummarizeError;

pub use cache::CachingSummarizer;
pub use extractive::ExtractiveSummarizer;
pub use openai::OpenAiSummarizer;

/// Three-field editorial note for one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub study_type: String,
    pub finding: String,
    pub so_what: String,
}

impl Summary {
    /// Clean every field; a summary without a finding is rejected.
    pub fn sanitized(self) -> Result<Self, SummarizeError> {
        let s = Summary {
            study_type: normalize_study_type(&sanitize_field(&self.study_type)),
            finding: sanitize_field(&self.finding),
            so_what: sanitize_field(&self.so_what),
        };
        if s.finding.is_empty() {
            return Err(SummarizeError::Malformed("empty finding".into()));
        }
        Ok(s)
    }

    /// Flat text form (plain-text email part, logs).
    pub fn as_text(&self) -> String {
        format!("{}. {} {}", self.study_type, self.finding, self.so_what)
            .trim()
            .to_string()
    }
}

/// One call per article; stateless from the caller's point of view.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, title: &str, abstract_text: &str) -> Result<Summary, SummarizeError>;
    fn name(&self) -> &'static str;
}

pub type DynSummarizer = Arc<dyn Summarizer>;

/// Factory: build a summarizer according to settings.
///
/// * `SUMMARIZER_MODE=extractive` → offline extractive summarizer (no API calls).
/// * otherwise OpenAI, which needs `OPENAI_API_KEY`.
///
/// Both are wrapped with the on-disk cache.
pub fn build_summarizer(settings: &Settings) -> anyhow::Result<DynSummarizer> {
    if settings.summarizer_mode.as_deref() == Some("extractive") {
        let inner = ExtractiveSummarizer;
        return Ok(Arc::new(CachingSummarizer::new(
            inner,
            settings.cache_dir.join("extractive"),
        )));
    }
    let key = settings
        .openai_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY missing (or set SUMMARIZER_MODE=extractive)"))?;
    let inner = OpenAiSummarizer::new(key, &settings.openai_model)?;
    Ok(Arc::new(CachingSummarizer::new(
        inner,
        settings.cache_dir.join("openai"),
    )))
}

/// Single line, control chars removed, whitespace collapsed.
pub fn sanitize_field(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sentence case, keeping `RCT`/`RCTs` upper-case ("META-ANALYSIS" → "Meta-analysis").
pub fn normalize_study_type(study_type: &str) -> String {
    let words: Vec<String> = study_type
        .split_whitespace()
        .enumerate()
        .map(|(i, w)| {
            let lower = w.to_lowercase();
            match lower.as_str() {
                "rct" => "RCT".to_string(),
                "rcts" => "RCTs".to_string(),
                _ if i == 0 => {
                    let mut cs = lower.chars();
                    match cs.next() {
                        Some(f) => f.to_uppercase().chain(cs).collect(),
                        None => lower,
                    }
                }
                _ => lower,
            }
        })
        .collect();
    words.join(" ")
}
