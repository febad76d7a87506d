// src/notify/render.rs
//! HTML + plain-text rendering of a digest batch. Pure; no I/O.

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::article::Article;
use crate::classify::{Classification, ClassifiedArticle};
use crate::config::SpecialtyConfig;
use crate::digest::{DigestBatch, DigestEntry};

const RCT_TYPES: &[&str] = &["randomized controlled trial", "randomised controlled trial"];
const RCT_PHRASES: &[&str] = &[
    "randomized controlled",
    "randomised controlled",
    "randomly assigned",
    "random assignment",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Publication type first, then trial wording in title/abstract.
pub fn is_rct(a: &Article) -> bool {
    if a
        .publication_types
        .iter()
        .any(|pt| RCT_TYPES.contains(&pt.trim().to_lowercase().as_str()))
    {
        return true;
    }
    let text = format!("{} {}", a.title, a.abstract_text).to_lowercase();
    RCT_PHRASES.iter().any(|p| text.contains(p))
}

/// `"Cardiology Weekly — Mar 4, 2026"`
pub fn subject_line(cfg: &SpecialtyConfig, generated_at: DateTime<Utc>) -> String {
    format!(
        "{} Weekly — {}",
        cfg.display_name,
        generated_at.format("%b %-d, %Y")
    )
}

pub fn render_email(
    batch: &DigestBatch,
    cfg: &SpecialtyConfig,
    generated_at: DateTime<Utc>,
) -> RenderedEmail {
    let subject = subject_line(cfg, generated_at);
    let human_date = generated_at.format("%B %-d, %Y").to_string();

    let featured = batch
        .entries
        .iter()
        .filter(|e| e.label == Classification::Priority)
        .count();
    let rct_count = batch.articles().filter(|a| is_rct(a)).count();
    let stats = header_stats(&human_date, batch.len(), featured, rct_count);

    let featured_cards: String = batch
        .entries
        .iter()
        .filter(|e| e.label == Classification::Priority)
        .map(|e| card_html(e, cfg))
        .collect();
    let other_cards: String = batch
        .entries
        .iter()
        .filter(|e| e.label != Classification::Priority)
        .map(|e| card_html(e, cfg))
        .collect();

    let featured_block = if featured_cards.is_empty() {
        "<div style=\"color:#888; font-size:14px; padding:16px;\">No featured studies this week.</div>".to_string()
    } else {
        featured_cards
    };
    let other_block = if other_cards.is_empty() {
        String::new()
    } else {
        format!(
            "<div style=\"font-size:18px; font-weight:600; margin:20px 0 12px;\">Other Papers</div>{other_cards}"
        )
    };
    let headlines_block = headlines_html(&batch.headlines);

    let html = format!(
        r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0"/>
    <title>{title}</title>
  </head>
  <body style="margin:0; padding:0; background:#f5f5f5; font-family:-apple-system, 'Segoe UI', Roboto, Arial, sans-serif;">
    <div style="max-width:680px; margin:0 auto; padding:24px 16px;">
      <div style="background:#fff; border:1px solid #e0e0e0; border-radius:8px; padding:24px; margin-bottom:20px;">
        <div style="font-size:24px; font-weight:700; margin-bottom:6px;">Weekly {name} Digest</div>
        <div style="color:#666; font-size:13px;">{stats}</div>
      </div>
      <div style="font-size:18px; font-weight:600; margin-bottom:12px;">Featured Studies</div>
      {featured_block}
      {other_block}
      {headlines_block}
      <div style="color:#999; font-size:11px; text-align:center; padding:16px;">
        Summaries automatically generated from abstracts. Refer to original publications for full details.
      </div>
    </div>
  </body>
</html>
"#,
        title = encode_text(&subject),
        name = encode_text(&cfg.display_name),
        stats = encode_text(&stats),
    );

    let text = render_text(batch, cfg, &subject, &stats);
    RenderedEmail {
        subject,
        html,
        text,
    }
}

fn header_stats(date: &str, total: usize, featured: usize, rcts: usize) -> String {
    let mut s = format!("{date} · {total} articles · {featured} featured");
    if rcts > 0 {
        s.push_str(&format!(" · {rcts} RCT{}", if rcts == 1 { "" } else { "s" }));
    }
    s
}

fn meta_line(a: &Article) -> String {
    let authors = a.authors.join(", ");
    [a.journal.as_str(), a.pub_date.as_str(), authors.as_str()]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" · ")
}

/// `None` unless the specialty opted in and has an endpoint.
fn feedback_links(a: &Article, cfg: &SpecialtyConfig) -> Option<(String, String)> {
    if !cfg.feedback_enabled {
        return None;
    }
    let base = cfg.feedback_url.as_deref()?.trim_end_matches('/');
    if base.is_empty() {
        return None;
    }
    let sep = if base.ends_with('?') || base.ends_with('&') {
        ""
    } else if base.contains('?') {
        "&"
    } else {
        "?"
    };
    let link =
        |vote: &str| format!("{base}{sep}specialty={}&pmid={}&vote={vote}", cfg.slug, a.id);
    Some((link("up"), link("down")))
}

fn card_html(e: &DigestEntry, cfg: &SpecialtyConfig) -> String {
    let a = &e.article;
    let badge = if is_rct(a) {
        r#"<span style="display:inline-block; padding:3px 10px; background:#e8f5e9; color:#2e7d32; font-size:10px; font-weight:600; border-radius:4px; margin-left:10px;">RCT</span>"#
    } else {
        ""
    };
    let feedback = match feedback_links(a, cfg) {
        Some((up, down)) => format!(
            r#"<div style="font-size:12px; margin-top:12px; color:#888;">Useful? <a href="{}">Yes</a> · <a href="{}">No</a></div>"#,
            encode_double_quoted_attribute(&up),
            encode_double_quoted_attribute(&down)
        ),
        None => String::new(),
    };

    format!(
        r#"
    <div style="border:1px solid #e0e0e0; border-radius:8px; padding:24px; margin:16px 0; background:#fff;">
      <div style="font-size:17px; font-weight:600; margin-bottom:6px;"><a href="{url}" style="color:#1a1a1a; text-decoration:none;">{title}</a>{badge}</div>
      <div style="font-size:12px; color:#888; margin-bottom:20px;">{meta}</div>
      <div style="font-size:11px; color:#888; font-weight:600; text-transform:uppercase;">Study Type</div>
      <div style="font-size:14px; margin-bottom:16px;">{study_type}</div>
      <div style="font-size:11px; color:#888; font-weight:600; text-transform:uppercase;">Finding</div>
      <div style="font-size:14px; margin-bottom:16px;">{finding}</div>
      <div style="background:#f9f9f9; padding:14px; border-radius:6px; border-left:3px solid #666;">
        <div style="font-size:11px; color:#888; font-weight:600; text-transform:uppercase;">So What?</div>
        <div style="font-size:14px; font-weight:500;">{so_what}</div>
      </div>{feedback}
    </div>"#,
        url = encode_double_quoted_attribute(&a.url),
        title = encode_text(&a.title),
        meta = encode_text(&meta_line(a)),
        study_type = encode_text(&e.summary.study_type),
        finding = encode_text(&e.summary.finding),
        so_what = encode_text(&e.summary.so_what),
    )
}

/// Title-only list for articles that were not summarized.
fn headlines_html(items: &[ClassifiedArticle]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let rows: String = items
        .iter()
        .map(|h| {
            let a = &h.article;
            let badge = if is_rct(a) {
                r#"<span style="display:inline-block; padding:2px 6px; background:#e8f5e9; color:#2e7d32; font-size:9px; font-weight:600; border-radius:3px; margin-left:6px;">RCT</span>"#
            } else {
                ""
            };
            format!(
                r#"
        <li style="margin:10px 0; padding:10px 0; border-bottom:1px solid #f0f0f0;">
          <a href="{url}" style="color:#2c2c2c; text-decoration:none; font-size:14px;">{title}</a>{badge}
          <div style="color:#888; font-size:12px; margin-top:4px;">{meta}</div>
        </li>"#,
                url = encode_double_quoted_attribute(&a.url),
                title = encode_text(&a.title),
                meta = encode_text(&meta_line(a)),
            )
        })
        .collect();
    format!(
        r#"<div style="font-size:18px; font-weight:600; margin:20px 0 12px;">More This Week</div>
      <ul style="list-style:none; margin:0 0 20px; background:#fff; border:1px solid #e0e0e0; border-radius:8px; padding:8px 24px;">{rows}
      </ul>"#
    )
}

fn render_text(batch: &DigestBatch, cfg: &SpecialtyConfig, subject: &str, stats: &str) -> String {
    let mut out = format!("{subject}\n{stats}\n");
    for (i, e) in batch.entries.iter().enumerate() {
        let a = &e.article;
        out.push_str(&format!("\n{}. {}", i + 1, a.title));
        if is_rct(a) {
            out.push_str(" [RCT]");
        }
        out.push_str(&format!("\n   {}\n   {}\n", meta_line(a), a.url));
        out.push_str(&format!("   Study type: {}\n", e.summary.study_type));
        out.push_str(&format!("   Finding: {}\n", e.summary.finding));
        out.push_str(&format!("   So what? {}\n", e.summary.so_what));
        if let Some((up, down)) = feedback_links(a, cfg) {
            out.push_str(&format!("   Useful? yes: {up}  no: {down}\n"));
        }
    }
    if !batch.headlines.is_empty() {
        out.push_str("\nMore this week:\n");
        for h in &batch.headlines {
            let a = &h.article;
            out.push_str(&format!("- {}", a.title));
            if is_rct(a) {
                out.push_str(" [RCT]");
            }
            out.push_str(&format!("\n  {}\n  {}\n", meta_line(a), a.url));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::Summary;
    use chrono::TimeZone;

    fn entry(id: &str, label: Classification, pub_type: &str) -> DigestEntry {
        DigestEntry {
            article: Article {
                id: id.into(),
                title: format!("Trial <{id}>"),
                journal: "Circulation".into(),
                pub_date: "2026-03-01".into(),
                publication_types: vec![pub_type.into()],
                url: format!("https://pubmed.ncbi.nlm.nih.gov/{id}/"),
                ..Default::default()
            },
            label,
            summary: Summary {
                study_type: "RCT".into(),
                finding: "HR 0.78 & lower".into(),
                so_what: "Changes practice.".into(),
            },
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 8, 0, 0).unwrap()
    }

    #[test]
    fn subject_has_no_zero_padding() {
        let cfg = SpecialtyConfig::new("cardiology", "Cardiology");
        assert_eq!(subject_line(&cfg, at()), "Cardiology Weekly — Mar 4, 2026");
    }

    #[test]
    fn rct_detection_uses_types_then_text() {
        let mut a = Article::default();
        assert!(!is_rct(&a));
        a.publication_types = vec!["Randomized Controlled Trial".into()];
        assert!(is_rct(&a));
        a.publication_types.clear();
        a.abstract_text = "Patients were randomly assigned to...".into();
        assert!(is_rct(&a));
    }

    #[test]
    fn html_escapes_and_counts() {
        let cfg = SpecialtyConfig::new("cardiology", "Cardiology");
        let batch = DigestBatch {
            entries: vec![
                entry("1", Classification::Priority, "Randomized Controlled Trial"),
                entry("2", Classification::Standard, "Journal Article"),
            ],
            ..Default::default()
        };
        let r = render_email(&batch, &cfg, at());
        assert!(r.html.contains("Trial &lt;1&gt;"));
        assert!(r.html.contains("HR 0.78 &amp; lower"));
        assert!(r.html.contains("2 articles · 1 featured · 1 RCT"));
        assert!(r.html.contains("Other Papers"));
        assert!(!r.html.contains("More This Week"));
        assert!(!r.html.contains("vote=up"));
        assert!(r.text.contains("1. Trial <1> [RCT]"));
    }

    #[test]
    fn headlines_are_listed_and_counted() {
        let cfg = SpecialtyConfig::new("cardiology", "Cardiology");
        let h = entry("3", Classification::Priority, "Randomized Controlled Trial");
        let batch = DigestBatch {
            entries: vec![entry("1", Classification::Priority, "Journal Article")],
            headlines: vec![ClassifiedArticle {
                article: h.article,
                label: Classification::Priority,
            }],
        };
        let r = render_email(&batch, &cfg, at());
        // headline-only articles count as articles but never as featured
        assert!(r.html.contains("2 articles · 1 featured · 1 RCT"));
        assert!(r.html.contains("More This Week"));
        assert!(r.html.contains(r#"href="https://pubmed.ncbi.nlm.nih.gov/3/""#));
        assert!(r.text.contains("More this week:\n- Trial <3> [RCT]"));
    }

    #[test]
    fn feedback_links_need_flag_and_url() {
        let mut cfg = SpecialtyConfig::new("cardiology", "Cardiology");
        cfg.feedback_enabled = true;
        let batch = DigestBatch {
            entries: vec![entry("9", Classification::Priority, "Journal Article")],
            ..Default::default()
        };
        assert!(!render_email(&batch, &cfg, at()).html.contains("vote="));

        cfg.feedback_url = Some("https://fb.example/vote/".into());
        let r = render_email(&batch, &cfg, at());
        assert!(r
            .html
            .contains("https://fb.example/vote?specialty=cardiology&amp;pmid=9&amp;vote=up"));
        assert!(r.text.contains("pmid=9&vote=down"));
    }

    #[test]
    fn feedback_url_with_query_is_extended_not_restarted() {
        let mut cfg = SpecialtyConfig::new("cardiology", "Cardiology");
        cfg.feedback_enabled = true;
        cfg.feedback_url = Some("https://fb.example/vote?src=mail".into());
        let batch = DigestBatch {
            entries: vec![entry("9", Classification::Priority, "Journal Article")],
            ..Default::default()
        };
        let r = render_email(&batch, &cfg, at());
        assert!(r
            .text
            .contains("https://fb.example/vote?src=mail&specialty=cardiology&pmid=9&vote=up"));
        assert!(!r.text.contains("mail?specialty"));

        cfg.feedback_url = Some("https://fb.example/vote?".into());
        let r = render_email(&batch, &cfg, at());
        assert!(r.text.contains("https://fb.example/vote?specialty=cardiology&pmid=9"));
    }
}
