// src/article.rs
//! Article record builder: turns raw fetched metadata into the canonical `Article`.
//!
//! Building is pure. The same raw record always yields the same article, which is what
//! lets a rerun reclassify a fetch window deterministically.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// How many authors are kept on an article.
pub const MAX_AUTHORS: usize = 3;

const PUBMED_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// Date fragments as they appear in the source record (any of them may be missing).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateParts {
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    /// Free-form fallback such as "2024 Jan-Feb".
    pub medline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorName {
    pub last_name: String,
    pub fore_name: Option<String>,
}

/// Un-normalized record as returned by a fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArticle {
    pub pmid: String,
    pub doi: Option<String>,
    pub title: String,
    /// Paragraphs already prefixed with their label ("METHODS: ..."), newline separated.
    pub abstract_text: String,
    pub journal: String,
    pub journal_abbrev: Option<String>,
    /// Electronic publication date, preferred when complete.
    pub article_date: DateParts,
    /// Journal issue date.
    pub issue_date: DateParts,
    pub publication_types: Vec<String>,
    pub mesh_terms: Vec<String>,
    pub authors: Vec<AuthorName>,
}

/// Canonical, immutable article. Built fresh every run, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub doi: Option<String>,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub pub_date: String,
    pub publication_types: Vec<String>,
    pub mesh_terms: Vec<String>,
    pub journal: String,
    /// NLM title abbreviation (MedlineTA), kept so journal lists can name either form.
    pub journal_abbrev: Option<String>,
    pub specialty: String,
    pub url: String,
}

impl Article {
    pub fn has_abstract(&self) -> bool {
        !self.abstract_text.trim().is_empty()
    }
}

/// Anything that carries an article identifier (used by set-difference helpers).
pub trait Identified {
    fn identifier(&self) -> &str;
}

impl Identified for Article {
    fn identifier(&self) -> &str {
        &self.id
    }
}

/// Build the canonical article for `specialty` from a raw record.
pub fn build_article(raw: &RawArticle, specialty: &str) -> Result<Article, BuildError> {
    let id = raw.pmid.trim().to_string();
    if id.is_empty() {
        return Err(BuildError::MissingIdentifier);
    }

    let journal = match normalize_text(&raw.journal) {
        j if !j.is_empty() => j,
        _ => raw
            .journal_abbrev
            .as_deref()
            .map(normalize_text)
            .unwrap_or_default(),
    };

    let journal_abbrev = raw
        .journal_abbrev
        .as_deref()
        .map(normalize_text)
        .filter(|j| !j.is_empty());

    let doi = raw
        .doi
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Ok(Article {
        url: format!("{PUBMED_URL}/{id}/"),
        id,
        doi,
        title: normalize_text(&raw.title),
        abstract_text: normalize_paragraphs(&raw.abstract_text),
        authors: format_authors(&raw.authors),
        pub_date: format_pub_date(&raw.article_date, &raw.issue_date),
        publication_types: clean_terms(&raw.publication_types),
        mesh_terms: clean_terms(&raw.mesh_terms),
        journal,
        journal_abbrev,
        specialty: specialty.to_string(),
    })
}

/// Normalize text: decode entities, strip tags and control chars, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (inline <i>, <sup> survive in some titles)
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Control chars become spaces, then collapse whitespace
    out = out
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Normalize each line separately, dropping empties. Keeps labeled abstract sections apart.
fn normalize_paragraphs(s: &str) -> String {
    s.lines()
        .map(normalize_text)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim, drop empties, dedup keeping first occurrence (case-insensitive).
fn clean_terms(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = normalize_text(it);
        if t.is_empty() {
            continue;
        }
        if seen.insert(t.to_lowercase()) {
            out.push(t);
        }
    }
    out
}

fn format_authors(authors: &[AuthorName]) -> Vec<String> {
    authors
        .iter()
        .filter_map(|a| {
            let last = normalize_text(&a.last_name);
            if last.is_empty() {
                return None;
            }
            let initial = a
                .fore_name
                .as_deref()
                .map(normalize_text)
                .and_then(|f| f.chars().next());
            Some(match initial {
                Some(c) => format!("{last} {c}"),
                None => last,
            })
        })
        .take(MAX_AUTHORS)
        .collect()
}

/// `YYYY-MM-DD` from the electronic date when complete, else the issue date at
/// whatever precision it has, else its MedlineDate verbatim.
pub fn format_pub_date(article_date: &DateParts, issue_date: &DateParts) -> String {
    if let (Some(y), Some(m), Some(d)) = (
        non_empty(&article_date.year),
        non_empty(&article_date.month),
        non_empty(&article_date.day),
    ) {
        return format!("{y}-{:0>2}-{:0>2}", month_to_number(m), d);
    }

    let y = non_empty(&issue_date.year);
    let m = non_empty(&issue_date.month);
    let d = non_empty(&issue_date.day);
    match (y, m, d) {
        (Some(y), Some(m), Some(d)) => format!("{y}-{:0>2}-{:0>2}", month_to_number(m), d),
        (Some(y), Some(m), None) => format!("{y}-{:0>2}", month_to_number(m)),
        (Some(y), None, _) => y.to_string(),
        _ => non_empty(&issue_date.medline).unwrap_or_default().to_string(),
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// "Mar" / "March" / "3" → "3". Unknown names map to "0".
pub fn month_to_number(m: &str) -> String {
    let m = m.trim();
    if !m.is_empty() && m.chars().all(|c| c.is_ascii_digit()) {
        return m.to_string();
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix: String = m.chars().take(3).collect::<String>().to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|x| *x == prefix)
        .map(|i| (i + 1).to_string())
        .unwrap_or_else(|| "0".to_string())
}
