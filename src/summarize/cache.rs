// src/summarize/cache.rs
//! File cache in front of a summarizer. A rerun after a failed delivery finds its
//! summaries here instead of paying for them again.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use metrics::counter;
use sha2::{Digest, Sha256};

use super::{Summarizer, Summary};
use crate::error::SummarizeError;

pub struct CachingSummarizer<S: Summarizer> {
    inner: S,
    cache_dir: PathBuf,
}

impl<S: Summarizer> CachingSummarizer<S> {
    pub fn new(inner: S, cache_dir: PathBuf) -> Self {
        let _ = std::fs::create_dir_all(&cache_dir); // best-effort, once at startup
        Self { inner, cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[async_trait]
impl<S: Summarizer> Summarizer for CachingSummarizer<S> {
    async fn summarize(&self, title: &str, abstract_text: &str) -> Result<Summary, SummarizeError> {
        let key = cache_key(title, abstract_text);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key).await {
            counter!("digest_summary_cache_hits_total").increment(1);
            return Ok(hit);
        }
        counter!("digest_summary_cache_misses_total").increment(1);

        let fresh = self.inner.summarize(title, abstract_text).await?;
        if let Err(e) = write_cache_file(&self.cache_dir, &key, &fresh).await {
            tracing::debug!(target: "summarize", error = %e, "summary cache write failed");
        }
        Ok(fresh)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

fn cache_key(title: &str, abstract_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(abstract_text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

// tokio::fs: these run inside concurrent summary tasks on the runtime workers.
async fn read_cache_file(dir: &Path, key: &str) -> Option<Summary> {
    let s = tokio::fs::read_to_string(cache_path(dir, key)).await.ok()?;
    serde_json::from_str(&s).ok()
}

async fn write_cache_file(dir: &Path, key: &str, value: &Summary) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(&tmp, json.as_bytes()).await?;
    tokio::fs::rename(tmp, path).await?;
    Ok(())
}
