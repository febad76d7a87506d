//! specialty-digest — binary entrypoint.
//! Runs one weekly digest per configured specialty: fetch, classify, dedup, summarize, email.
//!
//! See `README.md` for configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use specialty_digest::config::{load_catalog_default, ConfigSource, Settings};
use specialty_digest::ingest::pubmed::PubMedFetcher;
use specialty_digest::notify::{Deliverer, EmailDeliverer, PreviewDeliverer};
use specialty_digest::pipeline::{RunCoordinator, RunOptions, RunReport};
use specialty_digest::state::FileStateStore;
use specialty_digest::summarize::build_summarizer;

#[derive(Parser, Debug)]
#[command(name = "specialty-digest", version, about = "Weekly per-specialty PubMed digest")]
struct Args {
    /// Specialty slug to run (repeatable). Default: every configured specialty.
    #[arg(long = "specialty", value_name = "SLUG")]
    specialties: Vec<String>,

    /// Publication-date lookback window in days.
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=3650))]
    days: u32,

    /// Maximum records fetched per specialty.
    #[arg(long, default_value_t = 300)]
    max: usize,

    /// Maximum articles summarized into one digest; the rest are listed as headlines.
    #[arg(long, default_value_t = 10)]
    max_summaries: usize,

    /// Abstracts shorter than this are listed as headlines instead of summarized.
    #[arg(long, default_value_t = 200)]
    min_abstract_chars: usize,

    /// Write an HTML preview instead of sending email.
    #[arg(long)]
    dry_run: bool,

    /// Do not read or write dedup state.
    #[arg(long)]
    test_mode: bool,

    /// JSON log lines instead of the compact formatter.
    #[arg(long, env = "DIGEST_LOG_JSON")]
    log_json: bool,

    /// Write Prometheus exposition text here after the run.
    #[arg(long, value_name = "PATH")]
    metrics_out: Option<PathBuf>,

    /// Write the JSON run report here.
    #[arg(long, value_name = "PATH")]
    report_out: Option<PathBuf>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("specialty_digest=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.log_json);

    let metrics = specialty_digest::metrics::install_recorder()?;
    let settings = Settings::from_env();
    tracing::info!(target: "pipeline", settings = %settings.describe(), "starting");

    // --- collaborators ---
    let catalog = Arc::new(load_catalog_default()?);
    let fetcher = Arc::new(
        PubMedFetcher::new(settings.ncbi_email.clone(), settings.ncbi_api_key.clone())
            .context("NCBI_EMAIL must be set for PubMed requests")?,
    );
    let summarizer = build_summarizer(&settings)?;
    let deliverer: Arc<dyn Deliverer> = if args.dry_run {
        Arc::new(PreviewDeliverer::new(settings.output_dir.clone()))
    } else {
        Arc::new(EmailDeliverer::from_settings(&settings)?)
    };
    let store = Arc::new(FileStateStore::new(settings.state_dir.clone()));

    let slugs = if args.specialties.is_empty() {
        catalog.slugs()
    } else {
        args.specialties.clone()
    };
    if slugs.is_empty() {
        bail!("no specialties configured");
    }

    let options = RunOptions {
        lookback_days: args.days,
        max_fetch: args.max,
        max_summaries: Some(args.max_summaries),
        min_abstract_chars: args.min_abstract_chars,
        test_mode: args.test_mode,
        ..RunOptions::default()
    };
    let coordinator =
        Arc::new(RunCoordinator::new(catalog, store, fetcher, summarizer, deliverer).with_options(options));

    // --- run ---
    let reports = coordinator.run_many(&slugs).await;

    for r in &reports {
        println!("{}", summary_line(r));
    }
    if let Some(path) = &args.report_out {
        let json: Vec<_> = reports.iter().map(RunReport::to_json).collect();
        std::fs::write(path, serde_json::to_string_pretty(&json)?)
            .with_context(|| format!("write report {}", path.display()))?;
    }
    if let Some(path) = &args.metrics_out {
        specialty_digest::metrics::write_textfile(&metrics, path)?;
    }

    let failed: Vec<_> = reports.iter().filter(|r| !r.succeeded()).map(|r| r.slug.as_str()).collect();
    if !failed.is_empty() {
        bail!("{} of {} run(s) failed: {}", failed.len(), reports.len(), failed.join(", "));
    }
    Ok(())
}

fn summary_line(r: &RunReport) -> String {
    let c = &r.counts;
    let mut line = format!(
        "[{}] {:?}: fetched={} priority={} standard={} excluded={} already_sent={} summarized={} headlines={} delivered={}",
        r.slug,
        r.stage,
        c.fetched,
        c.priority,
        c.standard,
        c.excluded,
        c.already_sent,
        c.summarized,
        c.headlines,
        c.delivered
    );
    if let Some(e) = &r.error {
        line.push_str(&format!(" error=\"{e}\""));
    }
    line
}
