pub mod firestore;
pub mod jsonl;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::FileCategory;
use crate::llm::ModelSettings;

pub use firestore::FirestoreReportStore;
pub use jsonl::JsonlReportStore;

pub const DEFAULT_COLLECTION: &str = "threat_reports";
pub const DEFAULT_DATABASE: &str = "(default)";

/// One analysis outcome as handed to the store. The creation timestamp is
/// always assigned by the store itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatReportRecord {
    pub file_name: String,
    pub file_type: FileCategory,
    pub content: String,
    pub analysis: String,
    /// Decorated severity label, e.g. `🟠 High`.
    pub score: String,
}

/// Append-only sink for analysis records. Nothing in the program reads them back.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Append a new record; re-submitting the same file name adds another one.
    async fn append(&self, record: &ThreatReportRecord) -> Result<()>;

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Supported persistence backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Jsonl,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "jsonl" | "file" => Ok(Self::Jsonl),
            other => bail!("unsupported store backend `{other}` (expected firestore or jsonl)"),
        }
    }
}

/// Configuration for the report store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// `firestore` (default) or `jsonl`.
    pub backend: String,
    /// Defaults to the model project.
    pub project: Option<String>,
    pub database: String,
    pub collection: String,
    pub endpoint: Option<String>,
    /// Defaults to the model access token.
    pub access_token: Option<String>,
    /// Target file for the `jsonl` backend.
    pub path: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: "firestore".to_string(),
            project: None,
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            endpoint: None,
            access_token: None,
            path: None,
        }
    }
}

impl StoreSettings {
    pub fn backend_kind(&self) -> Result<StoreBackend> {
        self.backend.parse()
    }

    pub fn validate(&self, model: &ModelSettings) -> Result<()> {
        match self.backend_kind()? {
            StoreBackend::Firestore => {
                anyhow::ensure!(
                    !self.collection.trim().is_empty(),
                    "store.collection must not be empty"
                );
                self.resolved_access_token(model)?;
            }
            StoreBackend::Jsonl => {
                self.path
                    .as_ref()
                    .context("store.path must be set for the jsonl backend")?;
            }
        }
        Ok(())
    }

    pub(crate) fn resolved_project<'a>(&'a self, model: &'a ModelSettings) -> &'a str {
        self.project.as_deref().unwrap_or(&model.project)
    }

    pub(crate) fn resolved_access_token(&self, model: &ModelSettings) -> Result<String> {
        match self.access_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => model
                .resolved_access_token()
                .context("the firestore store needs an access token"),
        }
    }
}

/// Construct the configured store once at start-up.
pub fn build_store(settings: &StoreSettings, model: &ModelSettings) -> Result<Arc<dyn ReportStore>> {
    Ok(match settings.backend_kind()? {
        StoreBackend::Firestore => Arc::new(FirestoreReportStore::new(settings, model)?),
        StoreBackend::Jsonl => {
            let path = settings
                .path
                .clone()
                .context("store.path must be set for the jsonl backend")?;
            Arc::new(JsonlReportStore::new(path))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_known_names() {
        assert_eq!("Firestore".parse::<StoreBackend>().unwrap(), StoreBackend::Firestore);
        assert_eq!("jsonl".parse::<StoreBackend>().unwrap(), StoreBackend::Jsonl);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn jsonl_backend_requires_path() {
        let settings = StoreSettings {
            backend: "jsonl".into(),
            ..StoreSettings::default()
        };
        let err = settings
            .validate(&ModelSettings::default())
            .expect_err("missing path should error");
        assert!(err.to_string().contains("store.path"));
    }

    #[test]
    fn project_and_token_fall_back_to_model() {
        let model = ModelSettings {
            access_token: Some("shared-token".into()),
            ..ModelSettings::default()
        };
        let settings = StoreSettings::default();
        assert_eq!(settings.resolved_project(&model), "security-threat-analyzer");
        assert_eq!(settings.resolved_access_token(&model).unwrap(), "shared-token");
        settings.validate(&model).expect("firestore settings should validate");

        let own = StoreSettings {
            project: Some("audit-project".into()),
            access_token: Some("store-token".into()),
            ..StoreSettings::default()
        };
        assert_eq!(own.resolved_project(&model), "audit-project");
        assert_eq!(own.resolved_access_token(&model).unwrap(), "store-token");
    }

    #[test]
    fn record_serializes_category_label() {
        let record = ThreatReportRecord {
            file_name: "auth.log".into(),
            file_type: FileCategory::LogFile,
            content: "sshd".into(),
            analysis: "ok".into(),
            score: "🟢 Low".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["file_type"], "Log File");
        assert_eq!(value["score"], "🟢 Low");
    }
}
