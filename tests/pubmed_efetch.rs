// tests/pubmed_efetch.rs
use specialty_digest::article::build_article;
use specialty_digest::error::FetchError;
use specialty_digest::ingest::pubmed::parse_efetch;

const EFETCH: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">38000001</PMID>
      <Article PubModel="Print-Electronic">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <Volume>149</Volume>
            <PubDate><Year>2024</Year><Month>Mar</Month></PubDate>
          </JournalIssue>
          <Title>Circulation</Title>
        </Journal>
        <ArticleTitle>Dapagliflozin in <i>HFpEF</i>: the &quot;DELIVER&quot; trial</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND" NlmCategory="BACKGROUND">SGLT2 inhibitors reduce events.</AbstractText>
          <AbstractText Label="RESULTS" NlmCategory="RESULTS">HR 0.82 (95% CI 0.73-0.92); P&lt;0.001.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Solomon</LastName><ForeName>Scott D</ForeName></Author>
          <Author ValidYN="Y"><LastName>McMurray</LastName><ForeName>John J V</ForeName></Author>
          <Author ValidYN="Y"><LastName>Claggett</LastName><ForeName>Brian</ForeName></Author>
          <Author ValidYN="Y"><CollectiveName>DELIVER Investigators</CollectiveName></Author>
        </AuthorList>
        <PublicationTypeList>
          <PublicationType UI="D016449">Randomized Controlled Trial</PublicationType>
          <PublicationType UI="D016428">Journal Article</PublicationType>
        </PublicationTypeList>
        <ArticleDate DateType="Electronic"><Year>2024</Year><Month>02</Month><Day>05</Day></ArticleDate>
      </Article>
      <MedlineJournalInfo><MedlineTA>Circulation</MedlineTA></MedlineJournalInfo>
      <MeshHeadingList>
        <MeshHeading><DescriptorName UI="D006333" MajorTopicYN="Y">Heart Failure</DescriptorName></MeshHeading>
        <MeshHeading><DescriptorName UI="D006801" MajorTopicYN="N">Humans</DescriptorName></MeshHeading>
      </MeshHeadingList>
      <CommentsCorrectionsList>
        <CommentsCorrections RefType="Cites"><PMID Version="1">12345</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">38000001</ArticleId>
        <ArticleId IdType="doi">10.1161/CIRCULATIONAHA.123.000001</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation Status="PubMed-not-MEDLINE" Owner="NLM">
      <PMID Version="1">38000002</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><MedlineDate>2024 Jan-Feb</MedlineDate></PubDate></JournalIssue>
          <Title></Title>
        </Journal>
        <ArticleTitle>Letter: on dapagliflozin</ArticleTitle>
        <PublicationTypeList><PublicationType>Letter</PublicationType></PublicationTypeList>
      </Article>
      <MedlineJournalInfo><MedlineTA>Eur Heart J</MedlineTA></MedlineJournalInfo>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>
"#;

#[test]
fn efetch_records_are_read_in_document_order() {
    let recs = parse_efetch(EFETCH).unwrap();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].pmid, "38000001");
    assert_eq!(recs[1].pmid, "38000002");
}

#[test]
fn first_record_fields() {
    let r = &parse_efetch(EFETCH).unwrap()[0];
    assert_eq!(r.title, "Dapagliflozin in HFpEF: the \"DELIVER\" trial");
    assert_eq!(
        r.abstract_text,
        "BACKGROUND: SGLT2 inhibitors reduce events.\nRESULTS: HR 0.82 (95% CI 0.73-0.92); P<0.001."
    );
    assert_eq!(r.journal, "Circulation");
    assert_eq!(r.doi.as_deref(), Some("10.1161/CIRCULATIONAHA.123.000001"));
    assert_eq!(
        r.publication_types,
        vec!["Randomized Controlled Trial", "Journal Article"]
    );
    assert_eq!(r.mesh_terms, vec!["Heart Failure", "Humans"]);
    assert_eq!(r.authors.len(), 4);
    assert_eq!(r.authors[0].last_name, "Solomon");
    assert_eq!(r.article_date.day.as_deref(), Some("05"));
    assert_eq!(r.issue_date.month.as_deref(), Some("Mar"));
}

#[test]
fn built_article_is_normalized() {
    let recs = parse_efetch(EFETCH).unwrap();
    let a = build_article(&recs[0], "cardiology").unwrap();
    assert_eq!(a.id, "38000001");
    assert_eq!(a.url, "https://pubmed.ncbi.nlm.nih.gov/38000001/");
    assert_eq!(a.authors, vec!["Solomon S", "McMurray J", "Claggett B"]);
    assert_eq!(a.pub_date, "2024-02-05");
    assert_eq!(a.specialty, "cardiology");
    assert_eq!(a.journal_abbrev.as_deref(), Some("Circulation"));

    // empty journal title falls back to the MEDLINE abbreviation; MedlineDate passes through
    let b = build_article(&recs[1], "cardiology").unwrap();
    assert_eq!(b.journal, "Eur Heart J");
    assert_eq!(b.pub_date, "2024 Jan-Feb");
    assert!(!b.has_abstract());
}

#[test]
fn truncated_document_is_malformed() {
    let res = parse_efetch("<PubmedArticleSet><PubmedArticle><MedlineCitation></PubmedArticle>");
    assert!(matches!(res, Err(FetchError::Malformed(_))));
}

#[test]
fn fetcher_requires_contact_email() {
    use specialty_digest::ingest::pubmed::PubMedFetcher;
    assert!(matches!(
        PubMedFetcher::new(None, None),
        Err(FetchError::MissingContact)
    ));
    assert!(matches!(
        PubMedFetcher::new(Some("  ".into()), Some("key".into())),
        Err(FetchError::MissingContact)
    ));
    assert!(PubMedFetcher::new(Some("me@example.org".into()), None).is_ok());
}
