//! Vertex AI `generateContent` client for Google publisher models.
//!
//! URL format:
//! `https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{model}:generateContent`

use super::gemini::{generate, http_client, GenerateContentRequest};
use super::{build_prompt, AnalysisClient, ModelSettings};
use crate::artifact::FileCategory;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct VertexClient {
    http: Client,
    url: String,
    access_token: String,
}

impl VertexClient {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let access_token = settings.resolved_access_token()?;
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", settings.region));
        let url = format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            base.trim_end_matches('/'),
            settings.project,
            settings.region,
            settings.model
        );
        let http = http_client(settings).context("failed to build Vertex AI HTTP client")?;
        Ok(Self {
            http,
            url,
            access_token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AnalysisClient for VertexClient {
    #[instrument(name = "vertex_generate", skip(self, content), fields(content_len = content.len()))]
    async fn analyze(&self, category: FileCategory, content: &str) -> Result<String> {
        let request = self
            .http
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&GenerateContentRequest::user_prompt(build_prompt(
                category, content,
            )));
        generate(request, "Vertex AI").await
    }
}
