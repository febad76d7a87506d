// src/pipeline.rs
//! # Run coordinator
//! Drives one specialty through
//! `Fetching → Classifying → Filtering → Summarizing → Delivering → Committing → Done`,
//! with `Failed` reachable from every stage.
//!
//! State rules:
//! - config and state are resolved before any collaborator is called; both failures are fatal
//! - a fetch failure leaves the store untouched
//! - every fetched id becomes `seen`; only ids the deliverer confirmed become `sent`
//! - a delivery failure still commits `seen` (never `sent`) so the next run re-offers the batch
//! - a commit failure after delivery is reported; the next run may send those articles again
//!
//! Nothing retries inside a run. Reruns are always safe. Two runs of the same slug in
//! one process never overlap: `run_many` drops repeated slugs and `run` holds a per-slug
//! guard from state load to commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::classify::{classify_all, Classification};
use crate::config::ConfigSource;
use crate::digest::{assemble, DEFAULT_MIN_ABSTRACT_CHARS, DEFAULT_SUMMARY_CONCURRENCY};
use crate::error::DigestError;
use crate::ingest::{build_all, Fetcher};
use crate::notify::Deliverer;
use crate::state::{DedupState, StateStore};
use crate::summarize::Summarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Fetching,
    Classifying,
    Filtering,
    Summarizing,
    Delivering,
    Committing,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub lookback_days: u32,
    pub max_fetch: usize,
    /// Cap on summarized entries; the overflow is listed as headlines. `None` summarizes
    /// every eligible candidate.
    pub max_summaries: Option<usize>,
    /// Abstracts shorter than this are listed as headlines, not summarized.
    pub min_abstract_chars: usize,
    pub summary_concurrency: usize,
    /// Neither read nor write persisted state.
    pub test_mode: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            max_fetch: 300,
            max_summaries: Some(10),
            min_abstract_chars: DEFAULT_MIN_ABSTRACT_CHARS,
            summary_concurrency: DEFAULT_SUMMARY_CONCURRENCY,
            test_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub fetched: usize,
    pub built: usize,
    pub priority: usize,
    pub standard: usize,
    pub excluded: usize,
    pub already_sent: usize,
    pub candidates: usize,
    pub summarized: usize,
    pub headlines: usize,
    pub summary_failures: usize,
    pub delivered: usize,
    pub newly_seen: usize,
}

/// Outcome of one specialty run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub slug: String,
    pub stage: RunStage,
    /// Stage the run was in when it failed.
    pub failed_at: Option<RunStage>,
    #[serde(serialize_with = "error_as_string")]
    pub error: Option<DigestError>,
    pub counts: RunCounts,
    /// Ids confirmed delivered and marked sent (in digest order).
    pub sent_ids: Vec<String>,
    pub test_mode: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

fn error_as_string<S: Serializer>(e: &Option<DigestError>, s: S) -> Result<S::Ok, S::Error> {
    match e {
        Some(e) => s.serialize_some(&format!("{}: {e}", e.kind())),
        None => s.serialize_none(),
    }
}

impl RunReport {
    fn start(slug: &str, test_mode: bool) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.to_string(),
            stage: RunStage::Fetching,
            failed_at: None,
            error: None,
            counts: RunCounts::default(),
            sent_ids: Vec::new(),
            test_mode,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    /// Terminal report for a run whose task died before it could report.
    pub fn aborted(slug: &str, reason: impl std::fmt::Display) -> Self {
        let mut r = Self::start(slug, false);
        r.stage = RunStage::Failed;
        r.failed_at = Some(RunStage::Fetching);
        r.error = Some(DigestError::Aborted(format!("{slug}: {reason}")));
        r
    }

    pub fn succeeded(&self) -> bool {
        self.stage == RunStage::Done
    }

    pub fn outcome(&self) -> &'static str {
        match (&self.stage, &self.error) {
            (RunStage::Done, _) => "done",
            (_, Some(e)) => e.kind(),
            _ => "failed",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

type StageResult<T> = Result<T, (RunStage, DigestError)>;

pub struct RunCoordinator {
    config: Arc<dyn ConfigSource>,
    store: Arc<dyn StateStore>,
    fetcher: Arc<dyn Fetcher>,
    summarizer: Arc<dyn Summarizer>,
    deliverer: Arc<dyn Deliverer>,
    options: RunOptions,
    running: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RunCoordinator {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        store: Arc<dyn StateStore>,
        fetcher: Arc<dyn Fetcher>,
        summarizer: Arc<dyn Summarizer>,
        deliverer: Arc<dyn Deliverer>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            summarizer,
            deliverer,
            options: RunOptions::default(),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn run_guard(&self, slug: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut g = self.running.lock().unwrap_or_else(|e| e.into_inner());
        g.entry(slug.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run one specialty to a terminal stage. Never panics on collaborator failure.
    pub async fn run(&self, slug: &str) -> RunReport {
        let guard = self.run_guard(slug);
        let _running = guard.lock().await;
        let t0 = Instant::now();
        let mut report = RunReport::start(slug, self.options.test_mode);

        match self.execute(slug, &mut report).await {
            Ok(()) => report.stage = RunStage::Done,
            Err((stage, err)) => {
                tracing::error!(
                    target: "pipeline",
                    specialty = %slug,
                    stage = ?stage,
                    kind = err.kind(),
                    error = %err,
                    "run failed"
                );
                report.stage = RunStage::Failed;
                report.failed_at = Some(stage);
                report.error = Some(err);
            }
        }

        report.finished_at = Utc::now();
        report.duration_ms = t0.elapsed().as_millis() as u64;
        crate::metrics::record_run(&report);
        tracing::info!(
            target: "pipeline",
            specialty = %slug,
            outcome = report.outcome(),
            fetched = report.counts.fetched,
            delivered = report.counts.delivered,
            ms = report.duration_ms,
            "run finished"
        );
        report
    }

    /// Run several specialties concurrently. Reports come back in `slugs` order, one per
    /// distinct slug; one failing specialty never affects another.
    pub async fn run_many(self: &Arc<Self>, slugs: &[String]) -> Vec<RunReport> {
        let mut unique: Vec<String> = Vec::with_capacity(slugs.len());
        for slug in slugs {
            if unique.contains(slug) {
                tracing::warn!(target: "pipeline", specialty = %slug, "specialty requested twice, running it once");
            } else {
                unique.push(slug.clone());
            }
        }

        let handles: Vec<_> = unique
            .iter()
            .map(|slug| {
                let this = Arc::clone(self);
                let slug = slug.clone();
                tokio::spawn(async move { this.run(&slug).await })
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for (slug, h) in unique.iter().zip(handles) {
            match h.await {
                Ok(report) => out.push(report),
                Err(e) => {
                    tracing::error!(target: "pipeline", specialty = %slug, error = %e, "run task died");
                    let report = RunReport::aborted(slug, e);
                    crate::metrics::record_run(&report);
                    out.push(report);
                }
            }
        }
        out
    }

    async fn execute(&self, slug: &str, report: &mut RunReport) -> StageResult<()> {
        let opts = &self.options;

        // 0) preconditions: no collaborator is touched if these fail
        let cfg = self
            .config
            .specialty(slug)
            .map_err(|e| (RunStage::Fetching, e))?;
        let mut state = if opts.test_mode {
            DedupState::empty(slug)
        } else {
            self.load_state(slug)
                .await
                .map_err(|e| (RunStage::Fetching, e))?
        };

        // 1) Fetching
        report.stage = RunStage::Fetching;
        let raw = self
            .fetcher
            .fetch(&cfg, opts.lookback_days, opts.max_fetch)
            .await
            .map_err(|e| (RunStage::Fetching, DigestError::from(e)))?;
        report.counts.fetched = raw.len();
        tracing::info!(target: "pipeline", specialty = %slug, fetcher = self.fetcher.name(), fetched = raw.len(), "fetched");

        // 2) Classifying; every fetched id becomes seen once the run commits
        report.stage = RunStage::Classifying;
        let articles = build_all(&raw, slug);
        report.counts.built = articles.len();
        let classified = classify_all(articles, &cfg);
        for c in &classified {
            match c.label {
                Classification::Priority => report.counts.priority += 1,
                Classification::Standard => report.counts.standard += 1,
                Classification::Excluded => report.counts.excluded += 1,
            }
        }
        report.counts.newly_seen = state.mark_seen(classified.iter().map(|c| c.article.id.as_str()));

        // 3) Filtering
        report.stage = RunStage::Filtering;
        let included: Vec<_> = classified
            .into_iter()
            .filter(|c| c.label != Classification::Excluded)
            .collect();
        let before = included.len();
        let candidates = state.filter_unsent(included);
        report.counts.already_sent = before - candidates.len();
        report.counts.candidates = candidates.len();
        tracing::debug!(
            target: "pipeline",
            specialty = %slug,
            candidates = candidates.len(),
            already_sent = report.counts.already_sent,
            "filtered"
        );

        // 4) Summarizing
        report.stage = RunStage::Summarizing;
        let assembled = assemble(
            candidates,
            opts.max_summaries,
            opts.min_abstract_chars,
            self.summarizer.clone(),
            opts.summary_concurrency,
        )
        .await;
        let batch = assembled.batch;
        report.counts.summarized = batch.entries.len();
        report.counts.headlines = batch.headlines.len();
        report.counts.summary_failures = assembled.failures.len();

        // 5) Delivering (never with an empty batch)
        report.stage = RunStage::Delivering;
        if batch.is_empty() {
            tracing::info!(target: "pipeline", specialty = %slug, "nothing new to deliver");
        } else {
            match self.deliverer.deliver(&batch, &cfg).await {
                Ok(delivery) => {
                    let confirmed: Vec<String> = batch
                        .ids()
                        .into_iter()
                        .filter(|id| delivery.get(id).copied().unwrap_or(false))
                        .collect();
                    state.mark_sent(confirmed.iter());
                    report.counts.delivered = confirmed.len();
                    report.sent_ids = confirmed;
                }
                Err(e) => {
                    // seen still advances; sent does not
                    if let Err(persist) = self.commit(&state).await {
                        tracing::error!(
                            target: "pipeline",
                            specialty = %slug,
                            error = %persist,
                            "could not record seen ids after delivery failure"
                        );
                    }
                    return Err((RunStage::Delivering, DigestError::from(e)));
                }
            }
        }

        // 6) Committing
        report.stage = RunStage::Committing;
        self.commit(&state)
            .await
            .map_err(|e| (RunStage::Committing, e))?;
        Ok(())
    }

    // Store I/O is blocking (file reads, fsync); keep it off the runtime workers.
    async fn load_state(&self, slug: &str) -> Result<DedupState, DigestError> {
        let store = Arc::clone(&self.store);
        let owned = slug.to_string();
        tokio::task::spawn_blocking(move || store.load(&owned))
            .await
            .map_err(|e| DigestError::Aborted(format!("{slug}: state load task: {e}")))?
    }

    async fn commit(&self, state: &DedupState) -> Result<(), DigestError> {
        if self.options.test_mode {
            tracing::debug!(target: "pipeline", specialty = %state.slug(), "test mode: commit skipped");
            return Ok(());
        }
        let store = Arc::clone(&self.store);
        let snapshot = state.clone();
        tokio::task::spawn_blocking(move || store.commit(&snapshot))
            .await
            .map_err(|e| DigestError::Aborted(format!("{}: state commit task: {e}", state.slug())))?
    }
}
