// src/config/specialty.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DigestError;

pub const ENV_SPECIALTIES_PATH: &str = "DIGEST_SPECIALTIES_PATH";
const DEFAULT_TOML_PATH: &str = "config/specialties.toml";
const DEFAULT_JSON_PATH: &str = "config/specialties.json";

/// Publication types that never make it into a digest.
pub const DEFAULT_EXCLUDED_TYPES: &[&str] = &[
    "Editorial",
    "Letter",
    "Comment",
    "News",
    "Erratum",
    "Published Erratum",
    "Retraction of Publication",
    "Retracted Publication",
];

/// Publication types counted as original research for the primary-journal rule.
pub const DEFAULT_RESEARCH_TYPES: &[&str] = &[
    "Clinical Trial",
    "Randomized Controlled Trial",
    "Meta-Analysis",
    "Systematic Review",
    "Multicenter Study",
    "Observational Study",
];

/// Per-specialty configuration. Loaded once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialtyConfig {
    /// Stable partition key for state; `[a-z0-9_-]+`.
    pub slug: String,
    pub display_name: String,
    #[serde(default)]
    pub primary_journals: Vec<String>,
    /// General (non-primary) journal allow-list.
    #[serde(default)]
    pub journals: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub mesh_terms: Vec<String>,
    #[serde(default = "default_research_types")]
    pub research_types: Vec<String>,
    #[serde(default = "default_excluded_types")]
    pub excluded_types: Vec<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub feedback_enabled: bool,
    #[serde(default)]
    pub feedback_url: Option<String>,
}

fn default_research_types() -> Vec<String> {
    DEFAULT_RESEARCH_TYPES.iter().map(|s| s.to_string()).collect()
}

fn default_excluded_types() -> Vec<String> {
    DEFAULT_EXCLUDED_TYPES.iter().map(|s| s.to_string()).collect()
}

impl SpecialtyConfig {
    /// Minimal config with default type sets; handy for tests and ad-hoc runs.
    pub fn new(slug: &str, display_name: &str) -> Self {
        Self {
            slug: slug.to_string(),
            display_name: display_name.to_string(),
            primary_journals: Vec::new(),
            journals: Vec::new(),
            keywords: Vec::new(),
            mesh_terms: Vec::new(),
            research_types: default_research_types(),
            excluded_types: default_excluded_types(),
            recipients: Vec::new(),
            feedback_enabled: false,
            feedback_url: None,
        }
    }

    /// Primary journals followed by the general allow-list, without duplicates.
    pub fn all_journals(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for j in self.primary_journals.iter().chain(self.journals.iter()) {
            if !out.iter().any(|x| x.eq_ignore_ascii_case(j)) {
                out.push(j.clone());
            }
        }
        out
    }

    fn cleaned(mut self) -> Self {
        self.slug = self.slug.trim().to_string();
        self.display_name = self.display_name.trim().to_string();
        for list in [
            &mut self.primary_journals,
            &mut self.journals,
            &mut self.keywords,
            &mut self.mesh_terms,
            &mut self.research_types,
            &mut self.excluded_types,
            &mut self.recipients,
        ] {
            *list = clean_list(std::mem::take(list));
        }
        self.feedback_url = self
            .feedback_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        self
    }
}

/// Slugs name files on disk, so they are restricted to a safe alphabet.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 64
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Supplies specialty configuration by slug.
pub trait ConfigSource: Send + Sync {
    /// Unknown slugs are a fatal `ConfigNotFound`.
    fn specialty(&self, slug: &str) -> Result<SpecialtyConfig, DigestError>;
    /// All known slugs, in catalog order.
    fn slugs(&self) -> Vec<String>;
}

/// All configured specialties, keyed by slug.
#[derive(Debug, Clone, Default)]
pub struct SpecialtyCatalog {
    order: Vec<String>,
    by_slug: BTreeMap<String, SpecialtyConfig>,
}

impl SpecialtyCatalog {
    pub fn from_configs(configs: Vec<SpecialtyConfig>) -> Result<Self, DigestError> {
        let mut cat = SpecialtyCatalog::default();
        for cfg in configs {
            let cfg = cfg.cleaned();
            if !is_valid_slug(&cfg.slug) {
                return Err(DigestError::InvalidSlug(cfg.slug));
            }
            if cfg.display_name.is_empty() {
                return Err(DigestError::Config(format!(
                    "specialty `{}` has no display_name",
                    cfg.slug
                )));
            }
            if cat.by_slug.contains_key(&cfg.slug) {
                return Err(DigestError::Config(format!(
                    "duplicate specialty slug `{}`",
                    cfg.slug
                )));
            }
            cat.order.push(cfg.slug.clone());
            cat.by_slug.insert(cfg.slug.clone(), cfg);
        }
        Ok(cat)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl ConfigSource for SpecialtyCatalog {
    fn specialty(&self, slug: &str) -> Result<SpecialtyConfig, DigestError> {
        self.by_slug
            .get(slug)
            .cloned()
            .ok_or_else(|| DigestError::ConfigNotFound(slug.to_string()))
    }

    fn slugs(&self) -> Vec<String> {
        self.order.clone()
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "specialty")]
    specialties: Vec<SpecialtyConfig>,
}

/// Load the catalog from an explicit path. Supports TOML or JSON formats.
pub fn load_catalog_from(path: &Path) -> Result<SpecialtyCatalog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading specialties from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let configs = parse_catalog(&content, ext.as_str())?;
    SpecialtyCatalog::from_configs(configs).map_err(|e| anyhow!(e))
}

/// Load the catalog using env var + fallbacks:
/// 1) $DIGEST_SPECIALTIES_PATH
/// 2) config/specialties.toml
/// 3) config/specialties.json
pub fn load_catalog_default() -> Result<SpecialtyCatalog> {
    if let Ok(p) = std::env::var(ENV_SPECIALTIES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_catalog_from(&pb);
        }
        return Err(anyhow!("{ENV_SPECIALTIES_PATH} points to non-existent path"));
    }
    for p in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_catalog_from(&pb);
        }
    }
    Err(anyhow!(
        "no specialty catalog found (set {ENV_SPECIALTIES_PATH} or create {DEFAULT_TOML_PATH})"
    ))
}

fn parse_catalog(s: &str, hint_ext: &str) -> Result<Vec<SpecialtyConfig>> {
    if hint_ext == "json" {
        return parse_json(s);
    }
    if hint_ext == "toml" {
        return parse_toml(s);
    }
    parse_toml(s).or_else(|_| parse_json(s))
}

fn parse_toml(s: &str) -> Result<Vec<SpecialtyConfig>> {
    let v: CatalogFile = toml::from_str(s).context("parsing specialties TOML")?;
    Ok(v.specialties)
}

fn parse_json(s: &str) -> Result<Vec<SpecialtyConfig>> {
    // Either `{"specialty": [...]}` or a bare array.
    if let Ok(v) = serde_json::from_str::<Vec<SpecialtyConfig>>(s) {
        return Ok(v);
    }
    let v: CatalogFile = serde_json::from_str(s).context("parsing specialties JSON")?;
    Ok(v.specialties)
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|x| x.eq_ignore_ascii_case(t)) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[[specialty]]
slug = "cardiology"
display_name = "Cardiology"
primary_journals = ["Circulation", " circulation ", "European Heart Journal"]
journals = ["Heart", ""]
keywords = ["heart failure"]

[[specialty]]
slug = "nephrology"
display_name = "Nephrology"
excluded_types = ["Letter"]
"#;

    #[test]
    fn toml_catalog_cleans_lists_and_applies_defaults() {
        let cat = SpecialtyCatalog::from_configs(parse_toml(TOML).unwrap()).unwrap();
        assert_eq!(cat.slugs(), vec!["cardiology", "nephrology"]);

        let c = cat.specialty("cardiology").unwrap();
        assert_eq!(c.primary_journals, vec!["Circulation", "European Heart Journal"]);
        assert_eq!(c.journals, vec!["Heart"]);
        assert_eq!(c.excluded_types.len(), DEFAULT_EXCLUDED_TYPES.len());
        assert!(!c.feedback_enabled);

        let n = cat.specialty("nephrology").unwrap();
        assert_eq!(n.excluded_types, vec!["Letter"]);
        assert_eq!(n.research_types.len(), DEFAULT_RESEARCH_TYPES.len());
    }

    #[test]
    fn unknown_slug_is_config_not_found() {
        let cat = SpecialtyCatalog::from_configs(parse_toml(TOML).unwrap()).unwrap();
        assert!(matches!(
            cat.specialty("dermatology"),
            Err(DigestError::ConfigNotFound(s)) if s == "dermatology"
        ));
    }

    #[test]
    fn unsafe_slugs_are_rejected() {
        assert!(is_valid_slug("cardio-2_x"));
        assert!(!is_valid_slug("../etc"));
        assert!(!is_valid_slug("Cardiology"));
        assert!(!is_valid_slug(""));
        let res = SpecialtyCatalog::from_configs(vec![SpecialtyConfig::new("a/b", "A")]);
        assert!(matches!(res, Err(DigestError::InvalidSlug(_))));
    }

    #[test]
    fn duplicate_slugs_are_rejected() {
        let res = SpecialtyCatalog::from_configs(vec![
            SpecialtyConfig::new("x", "X"),
            SpecialtyConfig::new("x", "X again"),
        ]);
        assert!(matches!(res, Err(DigestError::Config(_))));
    }

    #[test]
    fn json_accepts_bare_array() {
        let v = parse_json(r#"[{"slug":"onc","display_name":"Oncology"}]"#).unwrap();
        assert_eq!(v[0].slug, "onc");
    }

    #[test]
    fn all_journals_merges_without_duplicates() {
        let mut c = SpecialtyConfig::new("c", "C");
        c.primary_journals = vec!["Heart".into(), "Circulation".into()];
        c.journals = vec!["heart".into(), "JAMA Cardiology".into()];
        assert_eq!(c.all_journals(), vec!["Heart", "Circulation", "JAMA Cardiology"]);
    }
}
