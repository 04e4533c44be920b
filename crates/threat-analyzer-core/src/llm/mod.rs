mod gemini;
mod settings;
mod vertex;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::artifact::FileCategory;

pub use gemini::GeminiClient;
pub use settings::ModelSettings;
pub use vertex::VertexClient;

/// Client abstraction for the remote model that reviews uploaded artifacts.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Submit the prompt for one artifact and return the model's text unmodified.
    async fn analyze(&self, category: FileCategory, content: &str) -> Result<String>;

    /// Release client resources. The HTTP-backed clients hold nothing to release.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the security-review prompt, embedding category and content verbatim.
pub fn build_prompt(category: FileCategory, content: &str) -> String {
    format!(
        "You are a security assistant. Analyze the following {category} content. \
         Identify any security issues, misconfigurations, or vulnerabilities.\n\
         Provide clear and actionable remediation steps if needed.\n\
         \n\
         Content:\n\
         {content}\n"
    )
}

/// Offline client used when no remote model is configured.
#[derive(Debug, Default, Clone)]
pub struct NoopAnalysisClient;

#[async_trait]
impl AnalysisClient for NoopAnalysisClient {
    async fn analyze(&self, category: FileCategory, content: &str) -> Result<String> {
        Ok(format!(
            "## Analysis unavailable\n\nNo remote model is configured, so this {category} \
             ({} bytes) was not reviewed. Configure a model provider to receive findings \
             and remediation steps.",
            content.len()
        ))
    }
}

/// Supported model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Vertex,
    Gemini,
    Noop,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vertex" | "vertexai" | "vertex-ai" => Ok(Self::Vertex),
            "gemini" => Ok(Self::Gemini),
            "noop" => Ok(Self::Noop),
            other => bail!("unsupported model provider `{other}` (expected vertex, gemini or noop)"),
        }
    }
}

/// Construct the configured client once at start-up.
pub fn build_client(settings: &ModelSettings) -> Result<Arc<dyn AnalysisClient>> {
    let kind = settings.provider_kind()?;
    debug!(provider = ?kind, model = %settings.model, "building analysis client");
    Ok(match kind {
        ProviderKind::Vertex => Arc::new(VertexClient::new(settings)?),
        ProviderKind::Gemini => Arc::new(GeminiClient::new(settings)?),
        ProviderKind::Noop => Arc::new(NoopAnalysisClient),
    })
}
