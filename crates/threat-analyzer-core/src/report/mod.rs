mod html;
mod pdf;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, instrument};

use crate::artifact::FileCategory;
use crate::error::AnalyzerError;
use crate::severity::strip_decorations;

pub use html::markdown_to_html;
pub use pdf::{html_to_pdf, PageLayout};

pub const REPORT_TITLE: &str = "Security Threat Report";
pub const REPORT_FILE_NAME: &str = "threat_report.pdf";
pub const REPORT_MIME_TYPE: &str = "application/pdf";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Turns an analysis into a printable PDF with a fixed header block.
#[derive(Debug, Clone, Default)]
pub struct ReportRenderer {
    layout: PageLayout,
}

impl ReportRenderer {
    pub fn new(layout: PageLayout) -> Self {
        Self { layout }
    }

    /// Render using the current local time in the header.
    pub fn render(
        &self,
        analysis: &str,
        file_name: &str,
        category: FileCategory,
        severity_label: &str,
    ) -> Result<Vec<u8>, AnalyzerError> {
        self.render_at(
            analysis,
            file_name,
            category,
            severity_label,
            Local::now().naive_local(),
        )
    }

    #[instrument(name = "render_report", skip(self, analysis, severity_label), fields(analysis_len = analysis.len()))]
    pub fn render_at(
        &self,
        analysis: &str,
        file_name: &str,
        category: FileCategory,
        severity_label: &str,
        generated_at: NaiveDateTime,
    ) -> Result<Vec<u8>, AnalyzerError> {
        let html = self.render_html(analysis, file_name, category, severity_label, generated_at);
        let bytes = html_to_pdf(&html, self.layout).map_err(AnalyzerError::Render)?;
        debug!(pdf_bytes = bytes.len(), "report rendered");
        Ok(bytes)
    }

    /// The HTML stage on its own, header included.
    pub fn render_html(
        &self,
        analysis: &str,
        file_name: &str,
        category: FileCategory,
        severity_label: &str,
        generated_at: NaiveDateTime,
    ) -> String {
        let mut markdown = header_markdown(file_name, category, severity_label, generated_at);
        markdown.push_str(analysis);
        markdown_to_html(&markdown)
    }
}

/// Header block prepended to every report, ending with a horizontal rule.
///
/// Lines end in two spaces so they render as hard line breaks.
pub fn header_markdown(
    file_name: &str,
    category: FileCategory,
    severity_label: &str,
    generated_at: NaiveDateTime,
) -> String {
    format!(
        "# {REPORT_TITLE}\n\n\
         **Report generated on:** {}  \n\
         **File:** {file_name}  \n\
         **Type:** {category}  \n\
         **Threat Score:** {}\n\n\
         ---\n\n",
        generated_at.format(TIMESTAMP_FORMAT),
        strip_decorations(severity_label).trim(),
    )
}
