// src/summarize/extractive.rs
//! Offline summarizer: pulls the conclusion straight out of the abstract.
//! Deterministic and free; used for local runs and previews without an API key.

use async_trait::async_trait;

use super::{Summarizer, Summary};
use crate::error::SummarizeError;

pub struct ExtractiveSummarizer;

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, title: &str, abstract_text: &str) -> Result<Summary, SummarizeError> {
        if abstract_text.trim().is_empty() {
            return Err(SummarizeError::EmptyAbstract);
        }
        Summary {
            study_type: guess_study_type(title, abstract_text).to_string(),
            finding: pick_finding(abstract_text),
            so_what: "Not reported".to_string(),
        }
        .sanitized()
    }

    fn name(&self) -> &'static str {
        "extractive"
    }
}

/// Labeled RESULTS/CONCLUSIONS section if present, else the last paragraph.
fn pick_finding(abstract_text: &str) -> String {
    let lines: Vec<&str> = abstract_text.lines().filter(|l| !l.trim().is_empty()).collect();
    for wanted in ["CONCLUSION", "RESULTS", "FINDINGS"] {
        if let Some(l) = lines
            .iter()
            .find(|l| l.trim_start().to_ascii_uppercase().starts_with(wanted))
        {
            return strip_label(l).to_string();
        }
    }
    lines.last().map(|l| strip_label(l).to_string()).unwrap_or_default()
}

fn strip_label(line: &str) -> &str {
    match line.split_once(": ") {
        Some((label, rest)) if label.len() <= 40 && label.chars().all(|c| !c.is_lowercase()) => rest,
        _ => line,
    }
}

fn guess_study_type(title: &str, abstract_text: &str) -> &'static str {
    let t = format!("{title} {abstract_text}").to_lowercase();
    if t.contains("meta-analysis") || t.contains("meta analysis") {
        "Meta-analysis"
    } else if t.contains("systematic review") {
        "Systematic review"
    } else if t.contains("randomized") || t.contains("randomised") || t.contains("randomly assigned") {
        "RCT"
    } else if t.contains("cohort") {
        "Prospective cohort"
    } else {
        "Other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn takes_conclusion_section() {
        let abs = "BACKGROUND: Why.\nMETHODS: Patients were randomly assigned.\nCONCLUSIONS: Drug X reduced events.";
        let s = ExtractiveSummarizer.summarize("A trial", abs).await.unwrap();
        assert_eq!(s.finding, "Drug X reduced events.");
        assert_eq!(s.study_type, "RCT");
    }

    #[tokio::test]
    async fn unlabeled_abstract_uses_last_paragraph() {
        let s = ExtractiveSummarizer
            .summarize("Cohort of 10k", "First part.\nSecond part: with colon.")
            .await
            .unwrap();
        assert_eq!(s.finding, "Second part: with colon.");
        assert_eq!(s.study_type, "Prospective cohort");
    }

    #[tokio::test]
    async fn empty_abstract_fails() {
        assert_eq!(
            ExtractiveSummarizer.summarize("t", "").await,
            Err(SummarizeError::EmptyAbstract)
        );
    }
}
