// src/state/memory.rs
//! In-memory store for tests and `--test-mode` style runs.
//! Keeps the encoded bytes, so loads go through the same decoder as the file store.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{decode_state, encode_state, DedupState, StateStore};
use crate::error::DigestError;

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    units: Mutex<HashMap<String, Vec<u8>>>,
    fail_commits: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a partition with already-persisted state.
    pub fn with_state(self, state: &DedupState) -> Self {
        self.put_raw(state.slug(), encode_state(state));
        self
    }

    /// Store arbitrary bytes, e.g. to simulate a corrupt partition.
    pub fn put_raw(&self, slug: &str, bytes: Vec<u8>) {
        self.units
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(slug.to_string(), bytes);
    }

    /// Make every following commit fail with an I/O error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Current persisted state, as the next `load` would see it.
    pub fn snapshot(&self, slug: &str) -> Option<DedupState> {
        let bytes = self
            .units
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(slug)
            .cloned()?;
        decode_state(slug, &bytes).ok()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, slug: &str) -> Result<DedupState, DigestError> {
        let g = self.units.lock().unwrap_or_else(|e| e.into_inner());
        match g.get(slug) {
            Some(bytes) => decode_state(slug, bytes),
            None => Ok(DedupState::empty(slug)),
        }
    }

    fn commit(&self, state: &DedupState) -> Result<(), DigestError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(DigestError::Persist {
                slug: state.slug().to_string(),
                source: io::Error::new(io::ErrorKind::Other, "injected commit failure"),
            });
        }
        self.put_raw(state.slug(), encode_state(state));
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
