// tests/classify_rules.rs
use specialty_digest::article::Article;
use specialty_digest::classify::{classify, classify_all, Classification};
use specialty_digest::config::{ConfigSource, SpecialtyConfig};

fn cfg() -> SpecialtyConfig {
    let mut c = SpecialtyConfig::new("cardiology", "Cardiology");
    c.primary_journals = vec!["Circulation".into(), "European Heart Journal".into()];
    c.journals = vec!["Heart".into(), "American Heart Journal".into()];
    c.keywords = vec!["atrial fibrillation".into(), "TAVR".into()];
    c.mesh_terms = vec!["Heart Failure".into()];
    c
}

fn article(journal: &str, types: &[&str]) -> Article {
    Article {
        id: "1".into(),
        title: "A study".into(),
        abstract_text: "Some results.".into(),
        journal: journal.into(),
        publication_types: types.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[test]
fn excluded_type_wins_over_everything() {
    let mut a = article("Circulation", &["Randomized Controlled Trial", "Letter"]);
    a.title = "Atrial fibrillation after TAVR".into();
    a.mesh_terms = vec!["Heart Failure".into()];
    assert_eq!(classify(&a, &cfg()), Classification::Excluded);
}

#[test]
fn primary_journal_research_is_priority() {
    let a = article("european heart journal.", &["Meta-Analysis"]);
    assert_eq!(classify(&a, &cfg()), Classification::Priority);
}

#[test]
fn primary_journal_without_research_type_and_not_allow_listed_is_excluded() {
    let a = article("Circulation", &["Journal Article"]);
    assert_eq!(classify(&a, &cfg()), Classification::Excluded);

    let mut c = cfg();
    c.journals.push("Circulation".into());
    assert_eq!(classify(&a, &c), Classification::Standard);
}

#[test]
fn keyword_in_abstract_or_mesh_hit_is_priority_in_any_journal() {
    let mut a = article("Some Other Journal", &["Journal Article"]);
    a.abstract_text = "Patients undergoing TAVR were enrolled.".into();
    assert_eq!(classify(&a, &cfg()), Classification::Priority);

    let mut b = article("Some Other Journal", &["Journal Article"]);
    b.mesh_terms = vec!["heart failure".into()];
    assert_eq!(classify(&b, &cfg()), Classification::Priority);
}

#[test]
fn keyword_inside_a_longer_word_does_not_match() {
    let mut a = article("Some Other Journal", &["Journal Article"]);
    a.title = "TAVRs and STAVRO registry".into();
    assert_eq!(classify(&a, &cfg()), Classification::Excluded);
}

#[test]
fn allow_listed_journal_is_standard_otherwise_excluded() {
    assert_eq!(
        classify(&article("Heart", &["Journal Article"]), &cfg()),
        Classification::Standard
    );
    assert_eq!(
        classify(&article("Heart Rhythm", &["Journal Article"]), &cfg()),
        Classification::Excluded
    );
}

#[test]
fn classification_is_deterministic_and_total() {
    let inputs = vec![
        article("", &[]),
        article("Heart", &[]),
        article("Circulation", &["Editorial"]),
        article("Circulation", &["Clinical Trial"]),
        Article::default(),
    ];
    let c = cfg();
    let first: Vec<_> = inputs.iter().map(|a| classify(a, &c)).collect();
    let second: Vec<_> = inputs.iter().map(|a| classify(a, &c)).collect();
    assert_eq!(first, second);
    assert_eq!(first[4], Classification::Excluded);

    let labeled = classify_all(inputs, &c);
    assert_eq!(labeled.len(), 5);
    assert_eq!(labeled[3].label, Classification::Priority);
}

#[test]
fn pubmed_title_forms_match_the_shipped_journal_lists() {
    use specialty_digest::config::load_catalog_from;

    let catalog = load_catalog_from(std::path::Path::new("config/specialties.toml")).unwrap();
    let c = catalog.specialty("cardiology").unwrap();

    // Journal/Title as efetch returns it, with the MedlineTA alongside
    let fetched = [
        ("Circulation. Heart failure", "Circ Heart Fail"),
        ("JACC. Heart failure", "JACC Heart Fail"),
        ("Heart (British Cardiac Society)", "Heart"),
        ("Circulation. Arrhythmia and electrophysiology", "Circ Arrhythm Electrophysiol"),
        ("JACC. Cardiovascular imaging", "JACC Cardiovasc Imaging"),
        ("American heart journal", "Am Heart J"),
    ];
    for (title, abbrev) in fetched {
        let mut a = article(title, &["Journal Article"]);
        a.journal_abbrev = Some(abbrev.into());
        assert_eq!(classify(&a, &c), Classification::Standard, "{title}");
    }

    let mut primary = article("European heart journal", &["Randomized Controlled Trial"]);
    primary.journal_abbrev = Some("Eur Heart J".into());
    assert_eq!(classify(&primary, &c), Classification::Priority);
}
