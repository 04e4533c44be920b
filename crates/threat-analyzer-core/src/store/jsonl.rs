use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{ReportStore, ThreatReportRecord};

/// Appends one JSON object per line to a local file.
pub struct JsonlReportStore {
    path: PathBuf,
}

/// Line format written by [`JsonlReportStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReport {
    #[serde(flatten)]
    pub record: ThreatReportRecord,
    /// Assigned at write time by the store.
    pub timestamp: DateTime<Utc>,
}

impl JsonlReportStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReportStore for JsonlReportStore {
    #[instrument(name = "jsonl_append", skip(self, record), fields(path = %self.path.display()))]
    async fn append(&self, record: &ThreatReportRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create report directory {}", parent.display()))?;
        }

        let stored = StoredReport {
            record: record.clone(),
            timestamp: Utc::now(),
        };
        let mut line = serde_json::to_string(&stored).context("failed to encode report record")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open report file {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to append to report file {}", self.path.display()))?;
        file.flush().await?;

        debug!(file_name = %record.file_name, "report line appended");
        Ok(())
    }
}
