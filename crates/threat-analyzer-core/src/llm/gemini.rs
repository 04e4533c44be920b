use super::{build_prompt, AnalysisClient, ModelSettings};
use crate::artifact::FileCategory;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Client for the Generative Language API, authenticated with an API key.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let api_key = settings.resolved_api_key()?;
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            base.trim_end_matches('/'),
            settings.model
        );
        let http = http_client(settings).context("failed to build Gemini HTTP client")?;
        Ok(Self { http, url, api_key })
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    #[instrument(name = "gemini_generate", skip(self, content), fields(content_len = content.len()))]
    async fn analyze(&self, category: FileCategory, content: &str) -> Result<String> {
        let request = self
            .http
            .post(&self.url)
            .query(&[("key", &self.api_key)])
            .json(&GenerateContentRequest::user_prompt(build_prompt(
                category, content,
            )));
        generate(request, "Gemini").await
    }
}

pub(super) fn http_client(settings: &ModelSettings) -> reqwest::Result<Client> {
    let mut builder = Client::builder().user_agent(concat!(
        "threat-analyzer/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(secs) = settings.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build()
}

/// Send one `generateContent` call and return the first candidate's text.
pub(super) async fn generate(request: RequestBuilder, provider: &str) -> Result<String> {
    let response = request
        .send()
        .await
        .with_context(|| format!("failed to call {provider} generateContent API"))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        bail!("{provider} API error ({status}): {body}");
    }

    let message: GenerateContentResponse = response
        .json()
        .await
        .with_context(|| format!("failed to parse {provider} response"))?;
    let text = message.into_text().ok_or_else(|| {
        anyhow!("{provider} response missing candidate text")
    })?;
    debug!(provider, response_len = text.len(), "model response received");
    Ok(text)
}

#[derive(Debug, Serialize)]
pub(super) struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

impl GenerateContentRequest {
    pub(super) fn user_prompt(prompt: String) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user".into(),
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let parts: Vec<String> = candidate
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.concat())
        }
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn base_settings(url: String) -> ModelSettings {
        ModelSettings {
            provider: "gemini".into(),
            api_key: Some("test-key".into()),
            endpoint: Some(url),
            model: "gemini-test".into(),
            timeout_secs: Some(5),
            ..ModelSettings::default()
        }
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "## Findings\n"}, {"text": "High risk"}]}},
                {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(response.into_text().as_deref(), Some("## Findings\nHigh risk"));
    }

    #[test]
    fn response_without_candidates_has_no_text() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert!(response.into_text().is_none());
    }

    #[test]
    fn request_serializes_single_user_turn() {
        let value = serde_json::to_value(GenerateContentRequest::user_prompt("hi".into())).unwrap();
        assert_eq!(
            value,
            json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]})
        );
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn analyze_returns_model_text() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-test:generateContent")
                .query_param("key", "test-key")
                .body_contains("Analyze the following Log File content.");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "candidates": [
                        {"content": {"role": "model", "parts": [{"text": "Medium: weak ciphers"}]}}
                    ]
                }));
        });

        let client = GeminiClient::new(&base_settings(server.base_url())).unwrap();
        let text = client
            .analyze(FileCategory::LogFile, "sshd: accepted password")
            .await
            .unwrap();
        assert_eq!(text, "Medium: weak ciphers");
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn errors_are_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-test:generateContent");
            then.status(429).body("quota exhausted");
        });

        let client = GeminiClient::new(&base_settings(server.base_url())).unwrap();
        let err = client
            .analyze(FileCategory::Unknown, "x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Gemini API error"));
        assert!(err.to_string().contains("quota exhausted"));
        mock.assert_hits(1);
    }
}
