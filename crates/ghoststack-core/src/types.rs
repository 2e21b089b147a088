use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A file touched by the change set under review.
///
/// # Examples
///
/// ```
/// use ghoststack_core::ChangedFile;
///
/// let file = ChangedFile::new("src/auth.py", 12, 3);
/// assert_eq!(file.lines_changed(), 15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Repo-relative path with `/` separators.
    pub path: String,
    /// Lines added.
    pub additions: u64,
    /// Lines deleted.
    pub deletions: u64,
}

impl ChangedFile {
    /// Create a changed-file record.
    pub fn new(path: impl Into<String>, additions: u64, deletions: u64) -> Self {
        Self {
            path: path.into(),
            additions,
            deletions,
        }
    }

    /// Additions plus deletions.
    pub fn lines_changed(&self) -> u64 {
        self.additions + self.deletions
    }
}

/// Categorical risk of a change set.
///
/// # Examples
///
/// ```
/// use ghoststack_core::RiskLevel;
///
/// assert_eq!(RiskLevel::from_score(4), RiskLevel::High);
/// assert_eq!(RiskLevel::from_score(2), RiskLevel::Medium);
/// assert_eq!(RiskLevel::from_score(1), RiskLevel::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score 0–1.
    Low,
    /// Score 2–3.
    Medium,
    /// Score 4 and above.
    High,
}

impl RiskLevel {
    /// Map an accumulated integer risk score to a level.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=1 => Self::Low,
            2..=3 => Self::Medium,
            _ => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use ghoststack_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Markdown => "markdown",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Self::Text,
            "json" => Self::Json,
            "markdown" | "md" => Self::Markdown,
            _ => return Err(format!("'{s}' is not an output format (text, json, markdown)")),
        };
        Ok(format)
    }
}
