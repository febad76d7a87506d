// src/summarize/openai.rs
//! OpenAI provider (Chat Completions with a strict JSON schema). Requires an API key.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Summarizer, Summary};
use crate::error::SummarizeError;

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are writing a brief editorial note for a specialty research digest. \
Return JSON with exactly three fields:\n\
- study_type: the design, one of 'RCT', 'Meta-analysis', 'Systematic review', 'Prospective cohort', \
'Retrospective cohort', 'Case-control', 'Case series', 'Narrative review', 'Guideline', or 'Other'.\n\
- finding: the primary result or conclusion. For trials and observational studies include effect size, \
CI and p-value if reported. For reviews state the main synthesis.\n\
- so_what: one sentence on why a clinician should care.\n\n\
If a detail is not in the abstract, write 'Not reported'. No hype words. \
Use only information from the provided abstract.";

pub struct OpenAiSummarizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiSummarizer {
    pub fn new(api_key: String, model: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("specialty-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
            url: CHAT_URL.to_string(),
        })
    }

    /// Point at an OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    response_format: serde_json::Value,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

fn response_format() -> serde_json::Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "editorial_note",
            "strict": true,
            "schema": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "study_type": {"type": "string"},
                    "finding": {"type": "string"},
                    "so_what": {"type": "string"}
                },
                "required": ["study_type", "finding", "so_what"]
            }
        }
    })
}

/// Parse the model's message content into a sanitized summary.
pub fn parse_content(content: &str) -> Result<Summary, SummarizeError> {
    let s: Summary = serde_json::from_str(content.trim())
        .map_err(|e| SummarizeError::Malformed(e.to_string()))?;
    s.sanitized()
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, title: &str, abstract_text: &str) -> Result<Summary, SummarizeError> {
        if abstract_text.trim().is_empty() {
            return Err(SummarizeError::EmptyAbstract);
        }
        let user = format!("TITLE: {title}\nABSTRACT:\n{abstract_text}\n");
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.2,
            response_format: response_format(),
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SummarizeError::Http(format!("status {}", resp.status())));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| SummarizeError::Malformed(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(SummarizeError::Malformed("empty response".into()));
        }
        parse_content(&content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_content_accepts_schema_output() {
        let s = parse_content(
            r#"{"study_type":"RANDOMIZED CONTROLLED TRIAL","finding":"Lower mortality (HR 0.78).","so_what":"Supports early use."}"#,
        )
        .unwrap();
        assert_eq!(s.study_type, "Randomized controlled trial");
        assert_eq!(s.finding, "Lower mortality (HR 0.78).");
    }

    #[test]
    fn parse_content_rejects_non_json_and_missing_fields() {
        assert!(matches!(
            parse_content("Sure! Here is a summary"),
            Err(SummarizeError::Malformed(_))
        ));
        assert!(matches!(
            parse_content(r#"{"study_type":"RCT"}"#),
            Err(SummarizeError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn empty_abstract_is_rejected_before_any_request() {
        let s = OpenAiSummarizer::new("sk-test".into(), "gpt-4o-mini")
            .unwrap()
            .with_url("http://127.0.0.1:9/never");
        let res = s.summarize("Title", "   ").await;
        assert_eq!(res, Err(SummarizeError::EmptyAbstract));
    }
}
