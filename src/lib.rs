// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod article;
pub mod classify;
pub mod config;
pub mod digest;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod state;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::article::{build_article, Article, Identified, RawArticle};
pub use crate::classify::{classify, Classification, ClassifiedArticle};
pub use crate::config::{ConfigSource, Settings, SpecialtyCatalog, SpecialtyConfig};
pub use crate::digest::{DigestBatch, DigestEntry};
pub use crate::error::{BuildError, DeliveryError, DigestError, FetchError, SummarizeError};
pub use crate::ingest::Fetcher;
pub use crate::notify::{Deliverer, DeliveryReport};
pub use crate::pipeline::{RunCoordinator, RunOptions, RunReport, RunStage};
pub use crate::state::{DedupState, FileStateStore, MemoryStateStore, StateStore};
pub use crate::summarize::{Summarizer, Summary};
