use thiserror::Error;

/// Message raised when the HTML-to-PDF stage cannot produce a document.
pub const RENDER_FAILURE_MESSAGE: &str = "Failed to create PDF from markdown";

/// Failures that abort a single analysis run.
///
/// None of these are recovered inside the pipeline; each one ends the current
/// upload and is surfaced to the shell as-is.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("unsupported upload `{name}`: expected a .txt, .log or .json file or a Dockerfile")]
    UnsupportedUpload { name: String },
    #[error("uploaded file `{name}` is not valid UTF-8 text")]
    Decode {
        name: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("remote model call failed")]
    RemoteModel(#[source] anyhow::Error),
    #[error("failed to write threat report record")]
    StoreWrite(#[source] anyhow::Error),
    #[error("{}", RENDER_FAILURE_MESSAGE)]
    Render(#[source] anyhow::Error),
}
