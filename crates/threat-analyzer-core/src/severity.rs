use std::fmt;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Keywords in priority order; index into this array is the match priority.
const SEVERITY_KEYWORDS: [(&str, Severity); 3] = [
    ("critical", Severity::Critical),
    ("high", Severity::High),
    ("medium", Severity::Medium),
];

static KEYWORD_AUTOMATON: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(SEVERITY_KEYWORDS.iter().map(|(keyword, _)| keyword))
        .expect("severity keywords form a valid automaton")
});

// Pictograph blocks used by the decorated labels (and emoji in general).
static DECORATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        "[",
        "\u{1F600}-\u{1F64F}",
        "\u{1F300}-\u{1F5FF}",
        "\u{1F680}-\u{1F6FF}",
        "\u{1F700}-\u{1F77F}",
        "\u{1F780}-\u{1F7FF}",
        "\u{1F800}-\u{1F8FF}",
        "\u{1F900}-\u{1F9FF}",
        "\u{1FA00}-\u{1FA6F}",
        "\u{1FA70}-\u{1FAFF}",
        "]+"
    ))
    .expect("decoration pattern is a valid regex")
});

/// Ordinal threat label derived from model output.
///
/// Variants are declared in ascending urgency so the derived `Ord` puts
/// `Critical` on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Classify free-form analysis text by keyword.
    ///
    /// Case-insensitive substring search: "critical" beats "high" beats
    /// "medium", and anything else is `Low`. Negated mentions such as
    /// "no critical issues" still count.
    pub fn classify(analysis: &str) -> Self {
        KEYWORD_AUTOMATON
            .find_overlapping_iter(analysis)
            .map(|mat| mat.pattern().as_usize())
            .min()
            .map(|idx| SEVERITY_KEYWORDS[idx].1)
            .unwrap_or(Self::Low)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Label with its coloured marker, as shown on screen and persisted.
    pub fn decorated_label(self) -> &'static str {
        match self {
            Self::Critical => "🔴 Critical",
            Self::High => "🟠 High",
            Self::Medium => "🟡 Medium",
            Self::Low => "🟢 Low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Remove pictographic symbols so a label survives base-14 PDF fonts.
pub fn strip_decorations(text: &str) -> String {
    DECORATION_PATTERN.replace_all(text, "").into_owned()
}
