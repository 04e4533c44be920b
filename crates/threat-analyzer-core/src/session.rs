use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::artifact::UploadedArtifact;
use crate::error::AnalyzerError;
use crate::llm::AnalysisClient;
use crate::report::ReportRenderer;
use crate::severity::Severity;
use crate::store::{ReportStore, ThreatReportRecord};

/// Outcome of one pipeline run for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub analysis_text: String,
    pub severity: Severity,
    pub report_pdf: Vec<u8>,
}

/// A file handed in by the shell, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Analysis pipeline wired to its collaborators.
///
/// Clients are built once at start-up and shared; the pipeline itself holds no
/// per-session state.
#[derive(Clone)]
pub struct AnalysisPipeline {
    client: Arc<dyn AnalysisClient>,
    store: Arc<dyn ReportStore>,
    renderer: ReportRenderer,
}

impl AnalysisPipeline {
    pub fn new(
        client: Arc<dyn AnalysisClient>,
        store: Arc<dyn ReportStore>,
        renderer: ReportRenderer,
    ) -> Self {
        Self {
            client,
            store,
            renderer,
        }
    }

    /// Model call, classification, store write, then PDF render, in that order.
    ///
    /// A render failure does not undo the store write.
    #[instrument(name = "analysis_pipeline", skip(self, artifact), fields(file_name = artifact.name(), category = %artifact.category()))]
    pub async fn run(&self, artifact: &UploadedArtifact) -> Result<AnalysisResult, AnalyzerError> {
        let analysis_text = self
            .client
            .analyze(artifact.category(), artifact.raw_content())
            .await
            .map_err(AnalyzerError::RemoteModel)?;
        let severity = Severity::classify(&analysis_text);
        debug!(severity = %severity, "analysis classified");

        let record = ThreatReportRecord {
            file_name: artifact.name().to_string(),
            file_type: artifact.category(),
            content: artifact.raw_content().to_string(),
            analysis: analysis_text.clone(),
            score: severity.decorated_label().to_string(),
        };
        self.store
            .append(&record)
            .await
            .map_err(AnalyzerError::StoreWrite)?;

        let report_pdf = self.renderer.render(
            &analysis_text,
            artifact.name(),
            artifact.category(),
            severity.decorated_label(),
        )?;

        info!(severity = %severity, pdf_bytes = report_pdf.len(), "analysis complete");
        Ok(AnalysisResult {
            analysis_text,
            severity,
            report_pdf,
        })
    }

    /// Tear down both collaborators.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.client.shutdown().await?;
        self.store.shutdown().await
    }
}

/// Where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No file observed yet.
    Idle,
    /// A file is present but has no cached result.
    Analyzing,
    /// The cached result matches the current file.
    Displaying,
}

/// Per-session cache, keyed by the last observed file name.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    cached_result: Option<AnalysisResult>,
    last_file_name: Option<String>,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match (&self.last_file_name, &self.cached_result) {
            (None, _) => SessionPhase::Idle,
            (Some(_), None) => SessionPhase::Analyzing,
            (Some(_), Some(_)) => SessionPhase::Displaying,
        }
    }

    pub fn last_file_name(&self) -> Option<&str> {
        self.last_file_name.as_deref()
    }

    pub fn cached_result(&self) -> Option<&AnalysisResult> {
        self.cached_result.as_ref()
    }

    /// Record a file name; a different name drops the cached result.
    fn observe_name(&mut self, name: &str) {
        if self.last_file_name.as_deref() != Some(name) {
            self.cached_result = None;
            self.last_file_name = Some(name.to_string());
        }
    }
}

/// What the shell should show after an observation.
#[derive(Debug)]
pub enum SessionView<'a> {
    /// Nothing uploaded; prompt the user.
    Idle,
    Displaying {
        artifact: UploadedArtifact,
        result: &'a AnalysisResult,
        /// False when the result came from the cache.
        fresh: bool,
    },
}

/// Drives the pipeline for one interactive session.
///
/// Re-observing the same file name reuses the cached result, so the model is
/// called and the store written at most once per distinct name.
pub struct SessionController {
    pipeline: AnalysisPipeline,
    state: SessionState,
}

impl SessionController {
    pub fn new(pipeline: AnalysisPipeline) -> Self {
        Self {
            pipeline,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Handle one render of the shell with the current upload, if any.
    ///
    /// On error the cache stays empty, so observing the same name again
    /// retries the run.
    pub async fn observe(
        &mut self,
        upload: Option<Upload>,
    ) -> Result<SessionView<'_>, AnalyzerError> {
        let Some(upload) = upload else {
            return Ok(SessionView::Idle);
        };

        self.state.observe_name(&upload.name);
        let artifact = UploadedArtifact::from_upload(upload.name, upload.bytes)?;

        let fresh = self.state.cached_result.is_none();
        let result = match self.state.cached_result.take() {
            Some(cached) => {
                debug!(file_name = artifact.name(), "reusing cached analysis");
                cached
            }
            None => {
                info!(file_name = artifact.name(), "new upload, running analysis");
                self.pipeline.run(&artifact).await?
            }
        };

        Ok(SessionView::Displaying {
            artifact,
            result: self.state.cached_result.insert(result),
            fresh,
        })
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.pipeline.shutdown().await
    }
}
