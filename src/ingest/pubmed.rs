// src/ingest/pubmed.rs
//! PubMed E-utilities fetcher: `esearch` for PMIDs in the journal/date window, then
//! `efetch` in batches for the full records.
//!
//! esearch is small and regular, so it goes through `quick_xml::de`. efetch records carry
//! mixed content (`<i>`, `<sup>` inside titles and abstracts), so they are read with the
//! event reader instead.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use super::Fetcher;
use crate::article::{AuthorName, RawArticle};
use crate::config::SpecialtyConfig;
use crate::error::FetchError;

pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";
const TOOL_NAME: &str = "specialty-digest";
const EFETCH_BATCH: usize = 100;

pub struct PubMedFetcher {
    http: reqwest::Client,
    base_url: String,
    email: String,
    api_key: Option<String>,
    batch_size: usize,
    pause: Duration,
}

impl PubMedFetcher {
    /// NCBI requires a contact email on every request.
    pub fn new(email: Option<String>, api_key: Option<String>) -> Result<Self, FetchError> {
        let email = email
            .filter(|e| !e.trim().is_empty())
            .ok_or(FetchError::MissingContact)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("specialty-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        // 3 req/s without a key, 10 req/s with one.
        let pause = if api_key.is_some() {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(340)
        };
        Ok(Self {
            http,
            base_url: EUTILS_BASE.to_string(),
            email,
            api_key,
            batch_size: EFETCH_BATCH,
            pause,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String, FetchError> {
        let mut query: Vec<(&str, String)> = vec![
            ("db", "pubmed".to_string()),
            ("retmode", "xml".to_string()),
            ("tool", TOOL_NAME.to_string()),
            ("email", self.email.clone()),
        ];
        if let Some(k) = &self.api_key {
            query.push(("api_key", k.clone()));
        }
        query.extend(params.iter().cloned());

        let resp = self
            .http
            .get(format!("{}{endpoint}", self.base_url))
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }

    async fn esearch(&self, term: &str, max: usize) -> Result<(Vec<String>, u64), FetchError> {
        let xml = self
            .get(
                "esearch.fcgi",
                &[
                    ("term", term.to_string()),
                    ("retmax", max.to_string()),
                    ("retstart", "0".to_string()),
                    ("sort", "pub_date".to_string()),
                ],
            )
            .await?;
        parse_esearch(&xml)
    }
}

#[async_trait]
impl Fetcher for PubMedFetcher {
    async fn fetch(
        &self,
        cfg: &SpecialtyConfig,
        lookback_days: u32,
        max_count: usize,
    ) -> Result<Vec<RawArticle>, FetchError> {
        let journals = cfg.all_journals();
        if journals.is_empty() || max_count == 0 {
            tracing::warn!(target: "ingest", specialty = %cfg.slug, "no journals configured, nothing to fetch");
            return Ok(Vec::new());
        }

        let term = format!(
            "{} AND {}",
            build_journal_query(&journals),
            date_window_term(Utc::now().date_naive(), lookback_days)?
        );
        let (pmids, total) = match self.esearch(&term, max_count).await {
            Ok(v) => v,
            Err(e) => {
                counter!("digest_fetch_errors_total", "specialty" => cfg.slug.clone()).increment(1);
                return Err(e);
            }
        };
        tracing::info!(
            target: "ingest",
            specialty = %cfg.slug,
            found = pmids.len(),
            total,
            "esearch done"
        );

        let mut out = Vec::with_capacity(pmids.len());
        for chunk in pmids.chunks(self.batch_size) {
            tokio::time::sleep(self.pause).await;
            let xml = self
                .get("efetch.fcgi", &[("id", chunk.join(","))])
                .await
                .inspect_err(|_| {
                    counter!("digest_fetch_errors_total", "specialty" => cfg.slug.clone())
                        .increment(1);
                })?;
            let t0 = Instant::now();
            out.extend(parse_efetch(&xml)?);
            histogram!("digest_efetch_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "pubmed"
    }
}

/// `("Circulation"[jour] OR "Heart"[jour])`
pub fn build_journal_query(journals: &[String]) -> String {
    let parts: Vec<String> = journals
        .iter()
        .map(|j| format!("\"{}\"[jour]", j.replace('"', "")))
        .collect();
    format!("({})", parts.join(" OR "))
}

/// Publication-date range covering the last `days` days, inclusive of `today`.
pub fn date_window_term(today: NaiveDate, days: u32) -> Result<String, FetchError> {
    let start = today
        .checked_sub_signed(chrono::Duration::days(i64::from(days)))
        .ok_or(FetchError::InvalidWindow(days))?;
    Ok(format!(
        "(\"{}\"[dp] : \"{}\"[dp])",
        start.format("%Y/%m/%d"),
        today.format("%Y/%m/%d")
    ))
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(rename = "Count", default)]
    count: Option<String>,
    #[serde(rename = "IdList", default)]
    id_list: Option<IdList>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdList {
    #[serde(rename = "Id", default)]
    ids: Vec<String>,
}

/// PMIDs (in result order) and the total hit count.
pub fn parse_esearch(xml: &str) -> Result<(Vec<String>, u64), FetchError> {
    let res: ESearchResult =
        quick_xml::de::from_str(xml).map_err(|e| FetchError::Malformed(format!("esearch: {e}")))?;
    if let Some(err) = res.error.filter(|e| !e.trim().is_empty()) {
        return Err(FetchError::Malformed(format!("esearch error: {err}")));
    }
    let total = res
        .count
        .as_deref()
        .map(str::trim)
        .unwrap_or("0")
        .parse::<u64>()
        .map_err(|e| FetchError::Malformed(format!("esearch count: {e}")))?;
    let ids = res
        .id_list
        .map(|l| l.ids)
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Ok((ids, total))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatePart {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Pmid,
    Title,
    AbstractText,
    JournalTitle,
    MedlineTa,
    ArticleDate(DatePart),
    IssueDate(DatePart),
    MedlineDate,
    PubType,
    Mesh,
    LastName,
    ForeName,
    Doi,
}

#[derive(Debug)]
struct Capture {
    field: Field,
    depth: usize,
    label: Option<String>,
    buf: String,
}

#[derive(Default)]
struct EfetchParser {
    stack: Vec<String>,
    current: Option<RawArticle>,
    capture: Option<Capture>,
    out: Vec<RawArticle>,
}

impl EfetchParser {
    fn ends_with(&self, suffix: &[&str]) -> bool {
        self.stack.len() >= suffix.len()
            && self.stack[self.stack.len() - suffix.len()..]
                .iter()
                .zip(suffix)
                .all(|(a, b)| a == b)
    }

    fn date_part(name: &str) -> Option<DatePart> {
        match name {
            "Year" => Some(DatePart::Year),
            "Month" => Some(DatePart::Month),
            "Day" => Some(DatePart::Day),
            _ => None,
        }
    }

    fn field_for(&self, name: &str, e: &BytesStart) -> Option<(Field, Option<String>)> {
        let f = if self.ends_with(&["MedlineCitation", "PMID"]) {
            Field::Pmid
        } else if self.ends_with(&["Article", "ArticleTitle"]) {
            Field::Title
        } else if self.ends_with(&["Abstract", "AbstractText"]) {
            let label = attr(e, "Label").or_else(|| attr(e, "NlmCategory"));
            return Some((Field::AbstractText, label));
        } else if self.ends_with(&["Journal", "Title"]) {
            Field::JournalTitle
        } else if self.ends_with(&["MedlineJournalInfo", "MedlineTA"]) {
            Field::MedlineTa
        } else if self.ends_with(&["ArticleDate", name]) {
            Field::ArticleDate(Self::date_part(name)?)
        } else if self.ends_with(&["JournalIssue", "PubDate", "MedlineDate"]) {
            Field::MedlineDate
        } else if self.ends_with(&["JournalIssue", "PubDate", name]) {
            Field::IssueDate(Self::date_part(name)?)
        } else if self.ends_with(&["PublicationTypeList", "PublicationType"]) {
            Field::PubType
        } else if self.ends_with(&["MeshHeading", "DescriptorName"]) {
            Field::Mesh
        } else if self.ends_with(&["AuthorList", "Author", "LastName"]) {
            Field::LastName
        } else if self.ends_with(&["AuthorList", "Author", "ForeName"]) {
            Field::ForeName
        } else if self.ends_with(&["PubmedData", "ArticleIdList", "ArticleId"]) {
            if attr(e, "IdType").as_deref() != Some("doi") {
                return None;
            }
            Field::Doi
        } else {
            return None;
        };
        Some((f, None))
    }

    fn start(&mut self, e: &BytesStart) {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        self.stack.push(name.clone());

        if name == "PubmedArticle" {
            self.current = Some(RawArticle::default());
            return;
        }
        // Inline markup inside a captured field only contributes text.
        if self.current.is_none() || self.capture.is_some() {
            return;
        }
        if name == "Author" && self.ends_with(&["AuthorList", "Author"]) {
            if let Some(cur) = self.current.as_mut() {
                cur.authors.push(AuthorName::default());
            }
            return;
        }
        if let Some((field, label)) = self.field_for(&name, e) {
            self.capture = Some(Capture {
                field,
                depth: self.stack.len(),
                label,
                buf: String::new(),
            });
        }
    }

    fn text(&mut self, s: &str) {
        if let Some(c) = self.capture.as_mut() {
            c.buf.push_str(s);
        }
    }

    fn end(&mut self) {
        if self
            .capture
            .as_ref()
            .is_some_and(|c| c.depth == self.stack.len())
        {
            if let (Some(c), Some(cur)) = (self.capture.take(), self.current.as_mut()) {
                apply_capture(cur, c);
            }
        }
        if let Some(name) = self.stack.pop() {
            if name == "PubmedArticle" {
                if let Some(done) = self.current.take() {
                    self.out.push(done);
                }
            }
        }
    }
}

fn apply_capture(cur: &mut RawArticle, c: Capture) {
    let text = c.buf.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return;
    }
    match c.field {
        Field::Pmid => {
            if cur.pmid.is_empty() {
                cur.pmid = text;
            }
        }
        Field::Title => cur.title = text,
        Field::AbstractText => {
            let line = match c.label.filter(|l| !l.trim().is_empty()) {
                Some(l) => format!("{}: {text}", l.trim()),
                None => text,
            };
            if !cur.abstract_text.is_empty() {
                cur.abstract_text.push('\n');
            }
            cur.abstract_text.push_str(&line);
        }
        Field::JournalTitle => cur.journal = text,
        Field::MedlineTa => cur.journal_abbrev = Some(text),
        Field::ArticleDate(p) => set_part(&mut cur.article_date, p, text),
        Field::IssueDate(p) => set_part(&mut cur.issue_date, p, text),
        Field::MedlineDate => cur.issue_date.medline = Some(text),
        Field::PubType => cur.publication_types.push(text),
        Field::Mesh => cur.mesh_terms.push(text),
        Field::LastName => {
            if let Some(a) = cur.authors.last_mut() {
                a.last_name = text;
            }
        }
        Field::ForeName => {
            if let Some(a) = cur.authors.last_mut() {
                a.fore_name = Some(text);
            }
        }
        Field::Doi => {
            if cur.doi.is_none() {
                cur.doi = Some(text);
            }
        }
    }
}

fn set_part(d: &mut crate::article::DateParts, p: DatePart, v: String) {
    match p {
        DatePart::Year => d.year = Some(v),
        DatePart::Month => d.month = Some(v),
        DatePart::Day => d.day = Some(v),
    }
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Parse an efetch `PubmedArticleSet` document into raw records, in document order.
pub fn parse_efetch(xml: &str) -> Result<Vec<RawArticle>, FetchError> {
    let mut reader = Reader::from_str(xml);
    let mut p = EfetchParser::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => p.start(&e),
            Ok(Event::End(_)) => p.end(),
            Ok(Event::Text(t)) => {
                let s = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                p.text(&s);
            }
            Ok(Event::CData(t)) => p.text(&String::from_utf8_lossy(&t)),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(FetchError::Malformed(format!(
                    "efetch at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }
    counter!("digest_records_parsed_total").increment(p.out.len() as u64);
    Ok(p.out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_query_quotes_each_title() {
        let q = build_journal_query(&["Circulation".into(), "Heart".into()]);
        assert_eq!(q, r#"("Circulation"[jour] OR "Heart"[jour])"#);
    }

    #[test]
    fn date_window_spans_lookback() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        assert_eq!(
            date_window_term(today, 7).unwrap(),
            r#"("2024/03/01"[dp] : "2024/03/08"[dp])"#
        );
    }

    #[test]
    fn oversized_lookback_is_an_error_not_a_panic() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        assert!(matches!(
            date_window_term(today, u32::MAX),
            Err(FetchError::InvalidWindow(u32::MAX))
        ));
    }

    #[test]
    fn esearch_reads_ids_and_count() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" ?>
<!DOCTYPE eSearchResult PUBLIC "-//NLM//DTD esearch 20060628//EN" "https://eutils.ncbi.nlm.nih.gov/eutils/dtd/20060628/esearch.dtd">
<eSearchResult><Count>42</Count><RetMax>2</RetMax><RetStart>0</RetStart>
<IdList><Id>111</Id><Id>222</Id></IdList>
<QueryTranslation>"Circulation"[Journal]</QueryTranslation></eSearchResult>"#;
        let (ids, total) = parse_esearch(xml).unwrap();
        assert_eq!(ids, vec!["111", "222"]);
        assert_eq!(total, 42);
    }

    #[test]
    fn esearch_without_hits_is_empty() {
        let xml = "<eSearchResult><Count>0</Count><IdList/></eSearchResult>";
        let (ids, total) = parse_esearch(xml).unwrap();
        assert!(ids.is_empty());
        assert_eq!(total, 0);
    }
}
