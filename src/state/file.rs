// src/state/file.rs
//! One JSON file per specialty under a state directory.
//!
//! Writes go to a per-slug temp file in the same directory, are fsynced, then renamed
//! over the target, so a reader sees either the previous file or the new one.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::{decode_state, encode_state, DedupState, StateStore};
use crate::config::is_valid_slug;
use crate::error::DigestError;

#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
    // One lock per slug: same-slug commits serialize, different slugs never contend.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, slug: &str) -> Result<PathBuf, DigestError> {
        if !is_valid_slug(slug) {
            return Err(DigestError::InvalidSlug(slug.to_string()));
        }
        Ok(self.dir.join(format!("{slug}.json")))
    }

    fn slug_lock(&self, slug: &str) -> Arc<Mutex<()>> {
        let mut g = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        g.entry(slug.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl StateStore for FileStateStore {
    fn load(&self, slug: &str) -> Result<DedupState, DigestError> {
        let path = self.path_for(slug)?;
        let lock = self.slug_lock(slug);
        let _g = lock.lock().unwrap_or_else(|e| e.into_inner());

        match fs::read(&path) {
            Ok(bytes) => {
                let st = decode_state(slug, &bytes)?;
                debug!(
                    target: "state",
                    slug,
                    seen = st.seen().len(),
                    sent = st.sent().len(),
                    "state loaded"
                );
                Ok(st)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(target: "state", slug, "no state yet, starting empty");
                Ok(DedupState::empty(slug))
            }
            Err(e) => Err(DigestError::CorruptState {
                slug: slug.to_string(),
                reason: format!("unreadable {}: {e}", path.display()),
            }),
        }
    }

    fn commit(&self, state: &DedupState) -> Result<(), DigestError> {
        let slug = state.slug();
        let path = self.path_for(slug)?;
        let lock = self.slug_lock(slug);
        let _g = lock.lock().unwrap_or_else(|e| e.into_inner());

        write_atomic(&self.dir, &path, &encode_state(state)).map_err(|source| {
            DigestError::Persist {
                slug: slug.to_string(),
                source,
            }
        })?;
        info!(
            target: "state",
            slug,
            seen = state.seen().len(),
            sent = state.sent().len(),
            "state committed"
        );
        Ok(())
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    // Make the rename itself durable where the platform allows it.
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
    Ok(())
}
