// src/config/settings.rs
//! Runtime settings from the environment (`.env` is loaded by the binary).
//!
//! Secrets are kept here and never logged; `describe()` only reports presence and length.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub ncbi_email: Option<String>,
    pub ncbi_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    /// `extractive` switches to the offline summarizer (no API calls).
    pub summarizer_mode: Option<String>,
    pub smtp_host: String,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub email_from: Option<String>,
    /// Fallback recipients for specialties that list none.
    pub email_to: Vec<String>,
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        let smtp_user = var("SMTP_USER");
        Self {
            ncbi_email: var("NCBI_EMAIL"),
            ncbi_api_key: var("NCBI_API_KEY"),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            summarizer_mode: var("SUMMARIZER_MODE").map(|m| m.to_ascii_lowercase()),
            smtp_host: var("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            email_from: var("EMAIL_FROM").or_else(|| smtp_user.clone()),
            smtp_pass: var("SMTP_PASS"),
            smtp_user,
            email_to: var("EMAIL_TO")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            state_dir: var("DIGEST_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("state")),
            cache_dir: var("DIGEST_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cache/summaries")),
            output_dir: var("DIGEST_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
        }
    }

    /// Safe one-line diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "ncbi_email={} ncbi_key_len={} openai_key_len={} model={} smtp_host={} smtp_user_set={} state_dir={}",
            self.ncbi_email.is_some(),
            self.ncbi_api_key.as_deref().map(str::len).unwrap_or(0),
            self.openai_api_key.as_deref().map(str::len).unwrap_or(0),
            self.openai_model,
            self.smtp_host,
            self.smtp_user.is_some(),
            self.state_dir.display(),
        )
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Comma-separated list, trimmed, empties dropped.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
        .collect()
}
