use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::ProviderKind;

pub(crate) const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub(crate) const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub const DEFAULT_PROJECT: &str = "security-threat-analyzer";
pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";

/// Configuration for the remote model collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// `vertex` (default), `gemini` or `noop`.
    pub provider: String,
    pub project: String,
    pub region: String,
    pub model: String,
    /// Optional base URL override (tests, private endpoints).
    pub endpoint: Option<String>,
    /// OAuth bearer token for Vertex AI; falls back to `GOOGLE_OAUTH_ACCESS_TOKEN`.
    pub access_token: Option<String>,
    /// API key for the Generative Language API; falls back to `GEMINI_API_KEY`.
    pub api_key: Option<String>,
    /// No timeout is applied unless set.
    pub timeout_secs: Option<u64>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: "vertex".to_string(),
            project: DEFAULT_PROJECT.to_string(),
            region: DEFAULT_REGION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: None,
            access_token: None,
            api_key: None,
            timeout_secs: None,
        }
    }
}

impl ModelSettings {
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        self.provider.parse()
    }

    /// Bearer token from settings, else from the environment.
    pub fn resolved_access_token(&self) -> Result<String> {
        credential(self.access_token.as_deref(), ACCESS_TOKEN_ENV).with_context(|| {
            format!(
                "an access token is required for the vertex provider; set model.access_token or {ACCESS_TOKEN_ENV}"
            )
        })
    }

    /// API key from settings, else from the environment.
    pub fn resolved_api_key(&self) -> Result<String> {
        credential(self.api_key.as_deref(), API_KEY_ENV).with_context(|| {
            format!("an API key is required for the gemini provider; set model.api_key or {API_KEY_ENV}")
        })
    }

    /// Check the settings can build a client without touching the network.
    pub fn validate(&self) -> Result<()> {
        match self.provider_kind()? {
            ProviderKind::Vertex => {
                anyhow::ensure!(!self.project.trim().is_empty(), "model.project must not be empty");
                anyhow::ensure!(!self.region.trim().is_empty(), "model.region must not be empty");
                self.resolved_access_token()?;
            }
            ProviderKind::Gemini => {
                self.resolved_api_key()?;
            }
            ProviderKind::Noop => return Ok(()),
        }
        anyhow::ensure!(!self.model.trim().is_empty(), "model.model must not be empty");
        Ok(())
    }
}

pub(crate) fn credential(explicit: Option<&str>, env_key: &str) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(env_key).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
pub(crate) static ENV_LOCK: once_cell::sync::Lazy<std::sync::Mutex<()>> =
    once_cell::sync::Lazy::new(|| std::sync::Mutex::new(()));
