// src/state/mod.rs
//! Deduplication state: per-specialty `seen` and `sent` identifier sets.
//!
//! Invariants:
//! - `sent ⊆ seen` (marking sent also marks seen; loading folds stray sent ids into seen).
//! - Both sets only grow. Nothing here removes an identifier.
//! - `commit` is all-or-nothing from the point of view of the next `load`.

pub mod file;
pub mod memory;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::article::Identified;
use crate::error::DigestError;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// Durable, specialty-partitioned storage for `DedupState`.
pub trait StateStore: Send + Sync {
    /// Missing state is an empty state; unparsable state is `CorruptState`, never a reset.
    fn load(&self, slug: &str) -> Result<DedupState, DigestError>;
    /// Atomically replace the persisted state for `state.slug()`.
    fn commit(&self, state: &DedupState) -> Result<(), DigestError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupState {
    slug: String,
    seen: BTreeSet<String>,
    sent: BTreeSet<String>,
}

impl DedupState {
    /// First-run state for a specialty.
    pub fn empty(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            ..Default::default()
        }
    }

    /// Rebuild from persisted sets; sent ids missing from `seen` are folded in.
    pub fn from_parts<I, J>(slug: &str, seen: I, sent: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        let mut st = Self::empty(slug);
        st.mark_seen(seen);
        st.mark_sent(sent);
        st
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn seen(&self) -> &BTreeSet<String> {
        &self.seen
    }

    pub fn sent(&self) -> &BTreeSet<String> {
        &self.sent
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn is_sent(&self, id: &str) -> bool {
        self.sent.contains(id)
    }

    /// Items whose identifier is not in `sent`, in their original order.
    pub fn filter_unsent<T: Identified>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .filter(|it| !self.sent.contains(it.identifier()))
            .collect()
    }

    /// Record fetched identifiers. Returns how many were new.
    pub fn mark_seen<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for id in ids {
            let id = id.as_ref().trim();
            if !id.is_empty() && self.seen.insert(id.to_string()) {
                added += 1;
            }
        }
        added
    }

    /// Record identifiers confirmed delivered. Only call after a successful delivery.
    /// Returns how many were new to `sent`.
    pub fn mark_sent<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            self.seen.insert(id.to_string());
            if self.sent.insert(id.to_string()) {
                added += 1;
            }
        }
        added
    }

    /// Holds by construction; exposed for tests and diagnostics.
    pub fn sent_subset_of_seen(&self) -> bool {
        self.sent.is_subset(&self.seen)
    }
}

/// On-disk representation. `sent_pmids` is accepted for state written before `seen` existed.
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    specialty: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    seen: Vec<String>,
    #[serde(default, alias = "sent_pmids")]
    sent: Vec<String>,
}

/// Parse persisted bytes for `slug`.
pub fn decode_state(slug: &str, bytes: &[u8]) -> Result<DedupState, DigestError> {
    let corrupt = |reason: String| DigestError::CorruptState {
        slug: slug.to_string(),
        reason,
    };
    let file: StateFile = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    if let Some(owner) = file.specialty.as_deref() {
        if owner != slug {
            return Err(corrupt(format!("state belongs to specialty `{owner}`")));
        }
    }
    Ok(DedupState::from_parts(slug, file.seen, file.sent))
}

/// Serialize state with sorted sets and a fresh `updated_at`.
pub fn encode_state(state: &DedupState) -> Vec<u8> {
    let file = StateFile {
        specialty: Some(state.slug.clone()),
        updated_at: Some(Utc::now().to_rfc3339()),
        seen: state.seen.iter().cloned().collect(),
        sent: state.sent.iter().cloned().collect(),
    };
    // Only strings inside; serialization cannot fail.
    serde_json::to_vec_pretty(&file).unwrap_or_else(|_| b"{}".to_vec())
}
