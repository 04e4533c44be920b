use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{ReportStore, StoreSettings, ThreatReportRecord};
use crate::llm::ModelSettings;

const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com";
const TIMESTAMP_FIELD: &str = "timestamp";

/// Firestore REST store. Each append is a single `documents:commit` that
/// creates a fresh document and lets the server stamp `timestamp`.
#[derive(Debug, Clone)]
pub struct FirestoreReportStore {
    http: Client,
    commit_url: String,
    database_path: String,
    collection: String,
    access_token: String,
}

impl FirestoreReportStore {
    pub fn new(settings: &StoreSettings, model: &ModelSettings) -> Result<Self> {
        let access_token = settings.resolved_access_token(model)?;
        let database_path = format!(
            "projects/{}/databases/{}",
            settings.resolved_project(model),
            settings.database
        );
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let commit_url = format!(
            "{}/v1/{}/documents:commit",
            base.trim_end_matches('/'),
            database_path
        );
        let http = Client::builder()
            .user_agent(concat!("threat-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build Firestore HTTP client")?;
        Ok(Self {
            http,
            commit_url,
            database_path,
            collection: settings.collection.clone(),
            access_token,
        })
    }

    pub fn commit_url(&self) -> &str {
        &self.commit_url
    }
}

#[async_trait]
impl ReportStore for FirestoreReportStore {
    #[instrument(name = "firestore_append", skip(self, record), fields(file_name = %record.file_name))]
    async fn append(&self, record: &ThreatReportRecord) -> Result<()> {
        let document_id = Uuid::new_v4().simple().to_string();
        let payload = commit_payload(&self.database_path, &self.collection, &document_id, record);

        let response = self
            .http
            .post(&self.commit_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .context("failed to call Firestore commit API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Firestore API error ({}): {}", status, body);
        }

        info!(collection = %self.collection, document_id = %document_id, "threat report stored");
        Ok(())
    }
}

/// Build the commit body creating `{collection}/{document_id}`.
///
/// The write is preconditioned on the document not existing, so a commit can
/// never overwrite an earlier report.
pub fn commit_payload(
    database_path: &str,
    collection: &str,
    document_id: &str,
    record: &ThreatReportRecord,
) -> Value {
    json!({
        "writes": [{
            "currentDocument": { "exists": false },
            "update": {
                "fields": {
                    "analysis": { "stringValue": record.analysis },
                    "content": { "stringValue": record.content },
                    "file_name": { "stringValue": record.file_name },
                    "file_type": { "stringValue": record.file_type.label() },
                    "score": { "stringValue": record.score },
                },
                "name": format!("{database_path}/documents/{collection}/{document_id}"),
            },
            "updateTransforms": [{
                "fieldPath": TIMESTAMP_FIELD,
                "setToServerValue": "REQUEST_TIME",
            }],
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::FileCategory;
    use httpmock::prelude::*;

    fn record() -> ThreatReportRecord {
        ThreatReportRecord {
            file_name: "Dockerfile".into(),
            file_type: FileCategory::Dockerfile,
            content: "FROM ubuntu:latest".into(),
            analysis: "High: runs as root".into(),
            score: "🟠 High".into(),
        }
    }

    fn model() -> ModelSettings {
        ModelSettings {
            access_token: Some("ya29.test".into()),
            ..ModelSettings::default()
        }
    }

    #[test]
    fn commit_url_targets_default_database() {
        let store = FirestoreReportStore::new(&StoreSettings::default(), &model()).unwrap();
        assert_eq!(
            store.commit_url(),
            "https://firestore.googleapis.com/v1/projects/security-threat-analyzer/databases/(default)/documents:commit"
        );
    }

    #[test]
    fn payload_requests_server_timestamp() {
        let payload = commit_payload("projects/p/databases/(default)", "threat_reports", "abc", &record());
        let write = &payload["writes"][0];
        assert_eq!(
            write["update"]["name"],
            "projects/p/databases/(default)/documents/threat_reports/abc"
        );
        assert_eq!(write["updateTransforms"][0]["fieldPath"], "timestamp");
        assert_eq!(write["updateTransforms"][0]["setToServerValue"], "REQUEST_TIME");
        assert!(write["update"]["fields"].get("timestamp").is_none());
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn append_commits_one_document() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/projects/security-threat-analyzer/databases/(default)/documents:commit")
                .header("authorization", "Bearer ya29.test")
                .body_contains("threat_reports/");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"commitTime":"2024-01-01T00:00:00Z"}"#);
        });

        let settings = StoreSettings {
            endpoint: Some(server.base_url()),
            ..StoreSettings::default()
        };
        let store = FirestoreReportStore::new(&settings, &model()).unwrap();
        store.append(&record()).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn permission_denied_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(403).body("PERMISSION_DENIED");
        });

        let settings = StoreSettings {
            endpoint: Some(server.base_url()),
            ..StoreSettings::default()
        };
        let store = FirestoreReportStore::new(&settings, &model()).unwrap();
        let err = store.append(&record()).await.unwrap_err();
        assert!(err.to_string().contains("PERMISSION_DENIED"));
    }
}
