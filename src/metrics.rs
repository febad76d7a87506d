// src/metrics.rs
//! Prometheus metrics. Recording goes through the `metrics` facade everywhere; the binary
//! installs the recorder and may dump the exposition text to a file after the run.

use std::path::Path;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::pipeline::RunReport;

/// One-time metrics registration (so series carry help text).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_runs_total", "Specialty runs by outcome.");
        describe_counter!(
            "digest_articles_fetched_total",
            "Raw records returned by the literature database."
        );
        describe_counter!(
            "digest_articles_classified_total",
            "Articles by classification label."
        );
        describe_counter!(
            "digest_summary_failures_total",
            "Articles dropped because their summary failed."
        );
        describe_counter!(
            "digest_articles_delivered_total",
            "Articles confirmed delivered and marked sent."
        );
        describe_counter!("digest_records_parsed_total", "efetch records decoded from XML.");
        describe_counter!("digest_records_skipped_total", "Raw records without an identifier.");
        describe_counter!("digest_fetch_errors_total", "Literature database request failures.");
        describe_counter!("digest_summary_cache_hits_total", "Summaries served from disk.");
        describe_counter!("digest_summary_cache_misses_total", "Summaries requested upstream.");
        describe_histogram!("digest_efetch_parse_ms", "efetch XML parse time in milliseconds.");
        describe_histogram!("digest_run_ms", "Wall time of one specialty run in milliseconds.");
        describe_gauge!("digest_last_run_ts", "Unix ts when the specialty last finished a run.");
    });
}

/// Install the global Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}

/// Textfile-collector style dump.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    std::fs::write(path, handle.render()).with_context(|| format!("write {}", path.display()))
}

pub fn record_run(report: &RunReport) {
    let slug = report.slug.clone();
    let c = &report.counts;

    counter!("digest_runs_total", "specialty" => slug.clone(), "outcome" => report.outcome())
        .increment(1);
    counter!("digest_articles_fetched_total", "specialty" => slug.clone())
        .increment(c.fetched as u64);
    for (label, n) in [
        ("priority", c.priority),
        ("standard", c.standard),
        ("excluded", c.excluded),
    ] {
        counter!("digest_articles_classified_total", "specialty" => slug.clone(), "label" => label)
            .increment(n as u64);
    }
    counter!("digest_articles_delivered_total", "specialty" => slug.clone())
        .increment(c.delivered as u64);
    histogram!("digest_run_ms", "specialty" => slug.clone()).record(report.duration_ms as f64);
    gauge!("digest_last_run_ts", "specialty" => slug).set(report.finished_at.timestamp() as f64);
}
