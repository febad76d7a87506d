// src/digest.rs
//! # Digest assembly
//! Turns the unsent, classified articles of one run into an ordered, summarized batch.
//!
//! Order: Priority before Standard, fetch order within a class. Excluded never enters.
//!
//! Candidates are summarized while they fit under the cap and carry an abstract of at least
//! `min_abstract_chars`. The rest go out as headlines (title, journal, link) in the same
//! order. The split happens before summarization, so a failed summary shrinks the batch
//! rather than pulling in the next candidate, and a failed article is not turned into a
//! headline: it stays unsent for a later run.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::Semaphore;

use crate::article::{Article, Identified};
use crate::classify::{Classification, ClassifiedArticle};
use crate::error::SummarizeError;
use crate::summarize::{Summarizer, Summary};

pub const DEFAULT_SUMMARY_CONCURRENCY: usize = 4;
/// Shorter abstracts are listed as headlines instead of being summarized.
pub const DEFAULT_MIN_ABSTRACT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub article: Article,
    pub label: Classification,
    pub summary: Summary,
}

impl Identified for DigestEntry {
    fn identifier(&self) -> &str {
        &self.article.id
    }
}

/// One digest: summarized entries, then headline-only articles. May be empty; an empty
/// batch is never delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestBatch {
    pub entries: Vec<DigestEntry>,
    pub headlines: Vec<ClassifiedArticle>,
}

impl DigestBatch {
    /// Every article in the batch, summarized or not.
    pub fn len(&self) -> usize {
        self.entries.len() + self.headlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.headlines.is_empty()
    }

    /// Entries first, then headlines.
    pub fn articles(&self) -> impl Iterator<Item = &Article> + '_ {
        self.entries
            .iter()
            .map(|e| &e.article)
            .chain(self.headlines.iter().map(|h| &h.article))
    }

    pub fn ids(&self) -> Vec<String> {
        self.articles().map(|a| a.id.clone()).collect()
    }

    pub fn count(&self, label: Classification) -> usize {
        self.entries.iter().filter(|e| e.label == label).count()
            + self.headlines.iter().filter(|h| h.label == label).count()
    }
}

/// Ordered candidates, split by what happens to them.
#[derive(Debug, Default)]
pub struct Selection {
    pub to_summarize: Vec<ClassifiedArticle>,
    pub headlines: Vec<ClassifiedArticle>,
}

/// Result of `assemble`: the batch plus the articles dropped on the way.
#[derive(Debug, Default)]
pub struct Assembled {
    pub batch: DigestBatch,
    pub failures: Vec<(String, SummarizeError)>,
}

/// Drop Excluded and stable-sort by class.
pub fn order_candidates(mut candidates: Vec<ClassifiedArticle>) -> Vec<ClassifiedArticle> {
    candidates.retain(|c| c.label != Classification::Excluded);
    candidates.sort_by_key(|c| c.label.rank());
    candidates
}

/// Order, then take up to `max` articles whose abstract has at least `min_abstract_chars`
/// characters for summarizing. Everything else becomes a headline.
pub fn select_candidates(
    candidates: Vec<ClassifiedArticle>,
    max: Option<usize>,
    min_abstract_chars: usize,
) -> Selection {
    let mut sel = Selection::default();
    for cand in order_candidates(candidates) {
        let eligible = cand.article.abstract_text.trim().chars().count() >= min_abstract_chars;
        let room = max.map_or(true, |m| sel.to_summarize.len() < m);
        if eligible && room {
            sel.to_summarize.push(cand);
        } else {
            sel.headlines.push(cand);
        }
    }
    sel
}

/// Summarize the selected candidates; failures are logged and left out of the batch.
///
/// Summaries run concurrently (bounded by `concurrency`) but results are collected in
/// candidate order, so the batch order never depends on which call finished first.
pub async fn assemble(
    candidates: Vec<ClassifiedArticle>,
    max: Option<usize>,
    min_abstract_chars: usize,
    summarizer: Arc<dyn Summarizer>,
    concurrency: usize,
) -> Assembled {
    let Selection {
        to_summarize,
        headlines,
    } = select_candidates(candidates, max, min_abstract_chars);
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));

    let mut handles = Vec::with_capacity(to_summarize.len());
    for cand in to_summarize {
        let summarizer = summarizer.clone();
        let permits = permits.clone();
        handles.push(tokio::spawn(async move {
            let res = match permits.acquire_owned().await {
                Ok(_permit) => {
                    summarizer
                        .summarize(&cand.article.title, &cand.article.abstract_text)
                        .await
                }
                Err(_) => Err(SummarizeError::Unavailable("summary pool closed".into())),
            };
            (cand, res)
        }));
    }

    let mut out = Assembled::default();
    out.batch.headlines = headlines;
    for h in handles {
        match h.await {
            Ok((cand, Ok(summary))) => out.batch.entries.push(DigestEntry {
                article: cand.article,
                label: cand.label,
                summary,
            }),
            Ok((cand, Err(e))) => {
                counter!("digest_summary_failures_total").increment(1);
                tracing::warn!(
                    target: "summarize",
                    id = %cand.article.id,
                    error = %e,
                    "summary failed; article left out of this digest"
                );
                out.failures.push((cand.article.id, e));
            }
            Err(join_err) => {
                // The id is lost with the task; the article stays unsent and may return later.
                counter!("digest_summary_failures_total").increment(1);
                tracing::error!(target: "summarize", error = %join_err, "summary task panicked");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn cand(id: &str, label: Classification) -> ClassifiedArticle {
        ClassifiedArticle {
            article: Article {
                id: id.into(),
                title: format!("title {id}"),
                abstract_text: format!("abstract {id} ").repeat(30),
                ..Default::default()
            },
            label,
        }
    }

    fn short(id: &str, label: Classification) -> ClassifiedArticle {
        let mut c = cand(id, label);
        c.article.abstract_text = "Too short to summarize.".into();
        c
    }

    struct Echo;

    #[async_trait]
    impl Summarizer for Echo {
        async fn summarize(&self, title: &str, _a: &str) -> Result<Summary, SummarizeError> {
            if title.ends_with("bad") {
                return Err(SummarizeError::Timeout);
            }
            Ok(Summary {
                study_type: "RCT".into(),
                finding: title.to_string(),
                so_what: String::new(),
            })
        }
        fn name(&self) -> &'static str {
            "echo"
        }
    }

    #[test]
    fn priority_first_then_fetch_order() {
        let got = order_candidates(
            vec![
                cand("s1", Classification::Standard),
                cand("x", Classification::Excluded),
                cand("p1", Classification::Priority),
                cand("s2", Classification::Standard),
                cand("p2", Classification::Priority),
            ],
        );
        assert_eq!(ids(&got), vec!["p1", "p2", "s1", "s2"]);
    }

    fn ids(v: &[ClassifiedArticle]) -> Vec<&str> {
        v.iter().map(|c| c.article.id.as_str()).collect()
    }

    #[test]
    fn cap_moves_overflow_to_headlines_in_order() {
        let sel = select_candidates(
            vec![
                cand("s1", Classification::Standard),
                cand("p1", Classification::Priority),
                cand("s2", Classification::Standard),
            ],
            Some(1),
            DEFAULT_MIN_ABSTRACT_CHARS,
        );
        assert_eq!(ids(&sel.to_summarize), vec!["p1"]);
        assert_eq!(ids(&sel.headlines), vec!["s1", "s2"]);

        let none = select_candidates(vec![cand("a", Classification::Standard)], Some(0), 0);
        assert!(none.to_summarize.is_empty());
        assert_eq!(ids(&none.headlines), vec!["a"]);
    }

    #[test]
    fn short_abstract_is_a_headline_and_does_not_use_a_slot() {
        let sel = select_candidates(
            vec![
                short("p0", Classification::Priority),
                cand("p1", Classification::Priority),
                cand("s1", Classification::Standard),
            ],
            Some(2),
            DEFAULT_MIN_ABSTRACT_CHARS,
        );
        assert_eq!(ids(&sel.to_summarize), vec!["p1", "s1"]);
        assert_eq!(ids(&sel.headlines), vec!["p0"]);

        // with no minimum, an empty abstract still goes to the summarizer
        let mut empty = cand("e", Classification::Standard);
        empty.article.abstract_text.clear();
        let sel = select_candidates(vec![empty], None, 0);
        assert_eq!(ids(&sel.to_summarize), vec!["e"]);
    }

    #[tokio::test]
    async fn failed_summary_shrinks_the_batch() {
        let out = assemble(
            vec![
                cand("p1", Classification::Priority),
                cand("bad", Classification::Priority),
                cand("s1", Classification::Standard),
                cand("s2", Classification::Standard),
            ],
            Some(3),
            DEFAULT_MIN_ABSTRACT_CHARS,
            Arc::new(Echo),
            2,
        )
        .await;
        // the failed article is dropped; s2 was over the cap and stays a headline
        assert_eq!(out.batch.ids(), vec!["p1", "s1", "s2"]);
        assert_eq!(out.batch.entries.len(), 2);
        assert_eq!(ids(&out.batch.headlines), vec!["s2"]);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].0, "bad");
        assert_eq!(out.batch.count(Classification::Priority), 1);
        assert_eq!(out.batch.count(Classification::Standard), 2);
    }
}
