// src/classify.rs
//! # Classifier
//! Pure, total mapping `(article, specialty config)` → `Classification`.
//! No I/O, no scores: rules are evaluated in order and the first match wins.
//!
//! 1. excluded publication type            → Excluded
//! 2. primary journal AND research type    → Priority
//! 3. keyword in title/abstract, or MeSH   → Priority
//! 4. general journal allow-list           → Standard
//! 5. anything else                        → Excluded

use serde::{Deserialize, Serialize};

use crate::article::{Article, Identified};
use crate::config::SpecialtyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Priority,
    Standard,
    Excluded,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Priority => "priority",
            Classification::Standard => "standard",
            Classification::Excluded => "excluded",
        }
    }

    /// Digest ordering rank (lower first).
    pub(crate) fn rank(self) -> u8 {
        match self {
            Classification::Priority => 0,
            Classification::Standard => 1,
            Classification::Excluded => 2,
        }
    }
}

/// An article together with the label it was given this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedArticle {
    pub article: Article,
    pub label: Classification,
}

impl Identified for ClassifiedArticle {
    fn identifier(&self) -> &str {
        &self.article.id
    }
}

pub fn classify(article: &Article, cfg: &SpecialtyConfig) -> Classification {
    // (1) Non-substantive content is dropped whatever the journal.
    if intersects(&article.publication_types, &cfg.excluded_types) {
        return Classification::Excluded;
    }

    // (2) Original research in a primary journal.
    if in_journal_list(&cfg.primary_journals, article)
        && intersects(&article.publication_types, &cfg.research_types)
    {
        return Classification::Priority;
    }

    // (3) Vocabulary hit.
    if matches_keywords(article, &cfg.keywords) || intersects(&article.mesh_terms, &cfg.mesh_terms)
    {
        return Classification::Priority;
    }

    // (4) General allow-list. A primary journal only lands here if it is listed in both.
    if in_journal_list(&cfg.journals, article) {
        return Classification::Standard;
    }

    Classification::Excluded
}

/// Classify a whole fetch, preserving order.
pub fn classify_all(articles: Vec<Article>, cfg: &SpecialtyConfig) -> Vec<ClassifiedArticle> {
    articles
        .into_iter()
        .map(|article| {
            let label = classify(&article, cfg);
            ClassifiedArticle { article, label }
        })
        .collect()
}

fn norm(s: &str) -> String {
    s.trim().trim_end_matches('.').to_lowercase()
}

fn contains_ci(list: &[String], value: &str) -> bool {
    let v = norm(value);
    !v.is_empty() && list.iter().any(|x| norm(x) == v)
}

/// Journal titles compare on a folded key: parenthetical qualifiers dropped, punctuation
/// as whitespace, case ignored. "Circulation. Heart failure" (PubMed) matches
/// "Circulation: Heart Failure"; "Heart (British Cardiac Society)" matches "Heart".
fn journal_key(s: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            c if c.is_alphanumeric() => out.extend(c.to_lowercase()),
            _ => out.push(' '),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full title or NLM abbreviation, either one listed is enough.
fn in_journal_list(list: &[String], article: &Article) -> bool {
    let forms: Vec<String> = std::iter::once(article.journal.as_str())
        .chain(article.journal_abbrev.as_deref())
        .map(journal_key)
        .filter(|k| !k.is_empty())
        .collect();
    !forms.is_empty() && list.iter().map(|j| journal_key(j)).any(|k| forms.contains(&k))
}

fn intersects(a: &[String], b: &[String]) -> bool {
    a.iter().any(|x| contains_ci(b, x))
}

fn matches_keywords(article: &Article, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let title = article.title.to_lowercase();
    let abstract_text = article.abstract_text.to_lowercase();
    keywords.iter().any(|k| {
        let k = k.trim().to_lowercase();
        !k.is_empty() && (contains_term(&title, &k) || contains_term(&abstract_text, &k))
    })
}

/// Substring match that refuses to land inside a longer word ("AF" must not hit "after").
fn contains_term(haystack: &str, needle: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        // advance by one char to stay on a char boundary
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_match_respects_word_boundaries() {
        assert!(contains_term("new onset af in elderly", "af"));
        assert!(!contains_term("after surgery", "af"));
        assert!(contains_term("heart failure.", "heart failure"));
        assert!(contains_term("(tavi)", "tavi"));
        assert!(!contains_term("stavit", "tavi"));
    }

    #[test]
    fn term_match_ignores_case_and_trailing_period() {
        let list = vec!["Meta-Analysis".to_string()];
        assert!(contains_ci(&list, "meta-analysis."));
        assert!(contains_ci(&list, " META-ANALYSIS "));
        assert!(!contains_ci(&list, "Network Meta-Analysis"));
        assert!(!contains_ci(&list, ""));
    }

    #[test]
    fn journal_key_folds_pubmed_title_forms() {
        assert_eq!(journal_key("Circulation. Heart failure"), "circulation heart failure");
        assert_eq!(journal_key("Circulation: Heart Failure"), "circulation heart failure");
        assert_eq!(journal_key("Heart (British Cardiac Society)"), "heart");
        assert_eq!(journal_key("JACC. Cardiovascular imaging"), "jacc cardiovascular imaging");
        assert_eq!(journal_key(" Heart. "), "heart");
        assert_eq!(journal_key("(only a qualifier)"), "");
    }

    #[test]
    fn journal_list_matches_title_or_abbreviation() {
        let list = vec!["Heart".to_string(), "Circ Heart Fail".to_string()];
        let mut a = Article {
            journal: "Heart Rhythm".into(),
            ..Default::default()
        };
        assert!(!in_journal_list(&list, &a));
        a.journal = "Circulation. Heart failure".into();
        a.journal_abbrev = Some("Circ Heart Fail".into());
        assert!(in_journal_list(&list, &a));
        assert!(!in_journal_list(&list, &Article::default()));
    }
}
