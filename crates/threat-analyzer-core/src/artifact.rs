use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;

const ACCEPTED_EXTENSIONS: [&str; 3] = [".txt", ".log", ".json"];

/// Coarse content type of an uploaded artifact, derived from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    #[serde(rename = "Dockerfile")]
    Dockerfile,
    #[serde(rename = "Log File")]
    LogFile,
    #[serde(rename = "Scan Report")]
    ScanReport,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl FileCategory {
    /// Classify a file name. Case-insensitive, first matching rule wins.
    pub fn detect(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("dockerfile") {
            Self::Dockerfile
        } else if name.ends_with(".log") {
            Self::LogFile
        } else if name.ends_with(".json") {
            Self::ScanReport
        } else {
            Self::Unknown
        }
    }

    /// Human-readable label used in prompts, records and reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Dockerfile => "Dockerfile",
            Self::LogFile => "Log File",
            Self::ScanReport => "Scan Report",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the upload surface takes a file with this name at all.
pub fn is_accepted_upload(name: &str) -> bool {
    let name = name.to_lowercase();
    name.contains("dockerfile") || ACCEPTED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// A single uploaded file, decoded and classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    name: String,
    raw_content: String,
    category: FileCategory,
}

impl UploadedArtifact {
    /// Build an artifact from already-decoded text.
    pub fn new(name: impl Into<String>, raw_content: impl Into<String>) -> Self {
        let name = name.into();
        let category = FileCategory::detect(&name);
        Self {
            name,
            raw_content: raw_content.into(),
            category,
        }
    }

    /// Accept, decode and classify raw upload bytes.
    pub fn from_upload(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AnalyzerError> {
        let name = name.into();
        if !is_accepted_upload(&name) {
            return Err(AnalyzerError::UnsupportedUpload { name });
        }
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Self::new(name, text)),
            Err(source) => Err(AnalyzerError::Decode { name, source }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    pub fn category(&self) -> FileCategory {
        self.category
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dockerfile_wins_over_extension() {
        assert_eq!(FileCategory::detect("Dockerfile"), FileCategory::Dockerfile);
        assert_eq!(
            FileCategory::detect("build.DOCKERFILE.log"),
            FileCategory::Dockerfile
        );
        assert_eq!(
            FileCategory::detect("prod-dockerfile.json"),
            FileCategory::Dockerfile
        );
    }

    #[test]
    fn extensions_map_to_categories() {
        assert_eq!(FileCategory::detect("syslog.LOG"), FileCategory::LogFile);
        assert_eq!(FileCategory::detect("trivy.json"), FileCategory::ScanReport);
        assert_eq!(FileCategory::detect("notes.txt"), FileCategory::Unknown);
        assert_eq!(FileCategory::detect("json"), FileCategory::Unknown);
    }

    #[test]
    fn labels_match_display() {
        assert_eq!(FileCategory::LogFile.to_string(), "Log File");
        assert_eq!(FileCategory::ScanReport.label(), "Scan Report");
        assert_eq!(
            serde_json::to_string(&FileCategory::ScanReport).unwrap(),
            "\"Scan Report\""
        );
    }

    #[test]
    fn upload_acceptance_follows_allowed_types() {
        assert!(is_accepted_upload("Dockerfile"));
        assert!(is_accepted_upload("api.dockerfile"));
        assert!(is_accepted_upload("notes.TXT"));
        assert!(is_accepted_upload("auth.log"));
        assert!(is_accepted_upload("scan.json"));
        assert!(!is_accepted_upload("image.png"));
        assert!(!is_accepted_upload("archive.log.gz"));
    }

    #[test]
    fn from_upload_rejects_unsupported_names() {
        let err = UploadedArtifact::from_upload("image.png", b"data".to_vec())
            .expect_err("png uploads should be rejected");
        assert!(matches!(err, AnalyzerError::UnsupportedUpload { name } if name == "image.png"));
    }

    #[test]
    fn from_upload_rejects_invalid_utf8() {
        let err = UploadedArtifact::from_upload("auth.log", vec![0xff, 0xfe, 0x00])
            .expect_err("invalid UTF-8 should fail decoding");
        assert!(matches!(err, AnalyzerError::Decode { ref name, .. } if name == "auth.log"));
    }

    #[test]
    fn from_upload_decodes_and_classifies() {
        let artifact =
            UploadedArtifact::from_upload("Dockerfile", b"FROM ubuntu:latest\nUSER root".to_vec())
                .unwrap();
        assert_eq!(artifact.name(), "Dockerfile");
        assert_eq!(artifact.category(), FileCategory::Dockerfile);
        assert_eq!(artifact.raw_content(), "FROM ubuntu:latest\nUSER root");
    }
}
