pub mod artifact;
pub mod error;
pub mod llm;
pub mod report;
pub mod session;
pub mod severity;
pub mod store;

pub use artifact::{is_accepted_upload, FileCategory, UploadedArtifact};
pub use error::AnalyzerError;
pub use llm::{build_client, AnalysisClient, ModelSettings, NoopAnalysisClient};
pub use report::{ReportRenderer, REPORT_FILE_NAME, REPORT_MIME_TYPE};
pub use session::{
    AnalysisPipeline, AnalysisResult, SessionController, SessionPhase, SessionState, SessionView,
    Upload,
};
pub use severity::Severity;
pub use store::{build_store, ReportStore, StoreSettings, ThreatReportRecord};
