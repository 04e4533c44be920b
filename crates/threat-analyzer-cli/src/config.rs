use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use threat_analyzer_core::{ModelSettings, StoreSettings};

pub const ENV_PREFIX: &str = "THREAT_ANALYZER";

/// Settings for both collaborators, layered defaults < file < environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelSettings,
    pub store: StoreSettings,
}

impl AppConfig {
    /// Load from an optional config file plus `THREAT_ANALYZER_*` variables,
    /// e.g. `THREAT_ANALYZER_MODEL__PROVIDER=noop`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| match path {
                Some(path) => format!("failed to load configuration from {}", path.display()),
                None => "failed to load configuration from environment".to_string(),
            })?;
        config
            .try_deserialize()
            .context("invalid threat analyzer configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate().context("invalid model settings")?;
        self.store
            .validate(&self.model)
            .context("invalid store settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;

    #[test]
    fn toml_file_overrides_defaults() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write(
            file.path(),
            "[model]\nprovider = \"noop\"\ntimeout_secs = 20\n\n[store]\nbackend = \"jsonl\"\npath = \"reports.jsonl\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.model.provider, "noop");
        assert_eq!(config.model.timeout_secs, Some(20));
        assert_eq!(config.model.region, "us-central1");
        assert_eq!(config.store.backend, "jsonl");
        assert_eq!(
            config.store.path.as_deref(),
            Some(Path::new("reports.jsonl"))
        );
        assert_eq!(config.store.collection, "threat_reports");
        config.validate().expect("noop + jsonl should validate");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/threat-analyzer.toml")))
            .expect_err("missing file should fail");
        assert!(format!("{err:#}").contains("threat-analyzer.toml"));
    }

    #[test]
    fn yaml_files_are_supported() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write(
            file.path(),
            "model:\n  provider: gemini\n  api_key: test-key\n  model: gemini-1.5-pro\n",
        )
        .unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.model.provider, "gemini");
        assert_eq!(config.model.model, "gemini-1.5-pro");
        assert!(config.model.validate().is_ok());
    }
}
