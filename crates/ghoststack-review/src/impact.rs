//! Hidden-impact analysis: files similar to a change set but not part of it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use ghoststack_brain::CodeIndex;
use ghoststack_core::{ChangedFile, GhostError, RiskLevel};
use serde::{Deserialize, Serialize};

use crate::risk::assess_risk;

/// Number of leading characters of a changed file used as the query.
const QUERY_CHARS: usize = 2000;

/// Number of changed files listed before the rest are summarised.
const MAX_LISTED_CHANGES: usize = 10;

/// A file outside the change set that resembles part of it.
///
/// # Examples
///
/// ```
/// use ghoststack_review::impact::RelatedFile;
///
/// let file = RelatedFile {
///     file_path: "billing/invoice.py".into(),
///     distance: 0.184,
///     chunk_id: "render".into(),
/// };
/// assert_eq!(file.relevance(), 82);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedFile {
    /// Repo-relative path.
    pub file_path: String,
    /// Lowest cosine distance of any of its chunks to any changed file.
    pub distance: f64,
    /// Chunk that produced `distance`.
    pub chunk_id: String,
}

impl RelatedFile {
    /// Relevance as a rounded percentage, `round((1 - distance) * 100)`.
    pub fn relevance(&self) -> i64 {
        ((1.0 - self.distance) * 100.0).round() as i64
    }
}

/// Related files and risk for a change set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    /// Base revision the change set was computed against, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Branch checked out at `HEAD` when the change set was computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    /// Files in the change set.
    pub changed_files: Vec<ChangedFile>,
    /// Related files, closest first. Never contains a changed path.
    pub related_files: Vec<RelatedFile>,
    /// Risk score, 0–6.
    pub risk_score: u32,
    /// Level derived from `risk_score`.
    pub risk_level: RiskLevel,
    /// Why the score is what it is.
    pub reasons: Vec<String>,
}

impl ImpactReport {
    /// Attach the base revision shown in rendered output.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Attach the branch being reviewed.
    pub fn with_head(mut self, head: impl Into<String>) -> Self {
        self.head = Some(head.into());
        self
    }

    /// Render as a Markdown review comment.
    ///
    /// # Examples
    ///
    /// ```
    /// use ghoststack_core::{ChangedFile, RiskLevel};
    /// use ghoststack_review::impact::{ImpactReport, RelatedFile};
    ///
    /// let report = ImpactReport {
    ///     base: None,
    ///     head: None,
    ///     changed_files: vec![ChangedFile::new("a.py", 3, 1)],
    ///     related_files: vec![RelatedFile {
    ///         file_path: "b.py".into(),
    ///         distance: 0.25,
    ///         chunk_id: "full".into(),
    ///     }],
    ///     risk_score: 1,
    ///     risk_level: RiskLevel::Low,
    ///     reasons: vec!["Found 1 related file(s)".into()],
    /// };
    /// let md = report.to_markdown();
    /// assert!(md.contains("- `b.py` — 75% relevant"));
    /// ```
    pub fn to_markdown(&self) -> String {
        let mut lines = vec!["## GhostStack Review".to_string(), String::new()];
        match (&self.head, &self.base) {
            (Some(head), Some(base)) => {
                lines.push(format!("**Comparing:** `{head}` → `{base}`"));
                lines.push(String::new());
            }
            (None, Some(base)) => {
                lines.push(format!("**Base:** `{base}`"));
                lines.push(String::new());
            }
            _ => {}
        }

        lines.push(format!("**Risk Level:** {}", self.risk_level));
        for reason in &self.reasons {
            lines.push(format!("  - {reason}"));
        }
        lines.push(String::new());

        lines.push("### Changed Files".to_string());
        lines.push(String::new());
        for file in self.changed_files.iter().take(MAX_LISTED_CHANGES) {
            lines.push(format!(
                "- `{}` (+{}, -{})",
                file.path, file.additions, file.deletions
            ));
        }
        if self.changed_files.len() > MAX_LISTED_CHANGES {
            lines.push(format!(
                "- ... and {} more",
                self.changed_files.len() - MAX_LISTED_CHANGES
            ));
        }
        lines.push(String::new());

        if self.related_files.is_empty() {
            lines.push("### No Hidden Impact Detected".to_string());
            lines.push(String::new());
            lines.push("No semantically related files found outside your changes.".to_string());
        } else {
            lines.push("### Hidden Impact".to_string());
            lines.push(String::new());
            lines.push("These files weren't changed but may be affected:".to_string());
            lines.push(String::new());
            for file in &self.related_files {
                let chunk = if file.chunk_id.is_empty() || file.chunk_id == "full" {
                    String::new()
                } else {
                    format!(" ({})", file.chunk_id)
                };
                lines.push(format!(
                    "- `{}`{chunk} — {}% relevant",
                    file.file_path,
                    file.relevance()
                ));
            }
        }

        lines.join("\n")
    }
}

impl fmt::Display for ImpactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.head, &self.base) {
            (Some(head), Some(base)) => writeln!(f, "Comparing {head} → {base}")?,
            (None, Some(base)) => writeln!(f, "Review against {base}")?,
            (Some(head), None) => writeln!(f, "Review of {head}")?,
            (None, None) => writeln!(f, "Review")?,
        }
        writeln!(f, "Risk: {} (score {})", self.risk_level, self.risk_score)?;
        for reason in &self.reasons {
            writeln!(f, "  - {reason}")?;
        }

        writeln!(f)?;
        writeln!(f, "Changed files ({}):", self.changed_files.len())?;
        for file in &self.changed_files {
            writeln!(
                f,
                "  {:<50} +{:<5} -{}",
                file.path, file.additions, file.deletions
            )?;
        }

        writeln!(f)?;
        if self.related_files.is_empty() {
            write!(f, "No hidden impact detected.")
        } else {
            writeln!(f, "Possibly impacted ({}):", self.related_files.len())?;
            for (i, file) in self.related_files.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                write!(
                    f,
                    "  {:<50} {:>3}%  {}",
                    file.file_path,
                    file.relevance(),
                    file.chunk_id
                )?;
            }
            Ok(())
        }
    }
}

/// Finds files semantically related to a change set.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::{CodeIndex, EmbeddingModel, VectorStore};
/// use ghoststack_brain::store::Metadata;
/// use ghoststack_core::ChangedFile;
/// use ghoststack_review::impact::ImpactAnalyzer;
///
/// let store = VectorStore::in_memory().unwrap();
/// let model = EmbeddingModel::fallback(32);
/// let index = CodeIndex::new(&store, &model);
/// index.add_file("a.py", "def a(): pass", Metadata::new()).unwrap();
/// index.add_file("b.py", "def b(): pass", Metadata::new()).unwrap();
///
/// let analyzer = ImpactAnalyzer::new(index);
/// let report = analyzer.find_related(&[ChangedFile::new("a.py", 1, 0)], 5).unwrap();
/// assert_eq!(report.related_files.len(), 1);
/// assert_eq!(report.related_files[0].file_path, "b.py");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ImpactAnalyzer<'a> {
    index: CodeIndex<'a>,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(index: CodeIndex<'a>) -> Self {
        Self { index }
    }

    /// Files related to `changed_paths`, closest first, excluding every changed path.
    ///
    /// Each changed file with a whole-file document is used as a query (its
    /// first 2000 characters) for `k + changed_paths.len()` neighbours. Files
    /// seen from several queries keep their lowest distance. Changed files
    /// without a whole-file document are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on store failure.
    pub fn related_files(
        &self,
        changed_paths: &[String],
        k: usize,
    ) -> Result<Vec<RelatedFile>, GhostError> {
        let excluded: HashSet<String> = changed_paths.iter().cloned().collect();
        let mut best: HashMap<String, RelatedFile> = HashMap::new();

        for path in changed_paths {
            let Some(content) = self.index.file_content(path)? else {
                tracing::debug!(file = %path, "no whole-file document, skipping");
                continue;
            };
            let query: String = content.chars().take(QUERY_CHARS).collect();

            let matches = self
                .index
                .search(&query, k + changed_paths.len(), Some(&excluded))?;
            for hit in matches {
                if excluded.contains(&hit.file_path) {
                    continue;
                }
                let closer = best
                    .get(&hit.file_path)
                    .map_or(true, |existing| hit.distance < existing.distance);
                if closer {
                    best.insert(
                        hit.file_path.clone(),
                        RelatedFile {
                            file_path: hit.file_path,
                            distance: hit.distance,
                            chunk_id: hit.chunk_id,
                        },
                    );
                }
            }
        }

        let mut related: Vec<RelatedFile> = best.into_values().collect();
        related.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        Ok(related)
    }

    /// Related files plus a risk assessment for `changed`.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on store failure.
    pub fn find_related(&self, changed: &[ChangedFile], k: usize) -> Result<ImpactReport, GhostError> {
        let paths: Vec<String> = changed.iter().map(|f| f.path.clone()).collect();
        let related_files = self.related_files(&paths, k)?;

        let total_lines: u64 = changed.iter().map(ChangedFile::lines_changed).sum();
        let risk = assess_risk(total_lines, changed.len(), related_files.len());

        Ok(ImpactReport {
            base: None,
            head: None,
            changed_files: changed.to_vec(),
            related_files,
            risk_score: risk.score,
            risk_level: risk.level,
            reasons: risk.reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghoststack_brain::store::Metadata;
    use ghoststack_brain::{EmbeddingModel, VectorStore};

    fn populated(store: &VectorStore, model: &EmbeddingModel) {
        let index = CodeIndex::new(store, model);
        for (path, body) in [
            ("auth/login.py", "def login(user): return user"),
            ("auth/session.py", "class Session: pass"),
            ("billing/invoice.py", "def total(items): return sum(items)"),
            ("web/app.ts", "export const app = 1;"),
        ] {
            index.add_file(path, body, Metadata::new()).unwrap();
        }
        // A chunked file has no whole-file document.
        index
            .add_chunk("big/module.py", "chunk_0", "x = 1", Metadata::new())
            .unwrap();
    }

    #[test]
    fn changed_paths_never_returned() {
        let store = VectorStore::in_memory().unwrap();
        let model = EmbeddingModel::fallback(64);
        populated(&store, &model);
        let analyzer = ImpactAnalyzer::new(CodeIndex::new(&store, &model));

        let changed = vec!["auth/login.py".to_string(), "auth/session.py".to_string()];
        let related = analyzer.related_files(&changed, 10).unwrap();
        assert!(!related.is_empty());
        for file in &related {
            assert!(!changed.contains(&file.file_path), "{} leaked", file.file_path);
        }
    }

    #[test]
    fn results_are_unique_and_sorted() {
        let store = VectorStore::in_memory().unwrap();
        let model = EmbeddingModel::fallback(64);
        populated(&store, &model);
        let analyzer = ImpactAnalyzer::new(CodeIndex::new(&store, &model));

        let changed = vec!["auth/login.py".to_string(), "web/app.ts".to_string()];
        let related = analyzer.related_files(&changed, 10).unwrap();

        let paths: HashSet<_> = related.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(paths.len(), related.len());
        for pair in related.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn files_without_whole_document_are_skipped() {
        let store = VectorStore::in_memory().unwrap();
        let model = EmbeddingModel::fallback(64);
        populated(&store, &model);
        let analyzer = ImpactAnalyzer::new(CodeIndex::new(&store, &model));

        let related = analyzer
            .related_files(&["big/module.py".to_string(), "missing.py".to_string()], 5)
            .unwrap();
        assert!(related.is_empty());
    }

    #[test]
    fn find_related_scores_risk() {
        let store = VectorStore::in_memory().unwrap();
        let model = EmbeddingModel::fallback(64);
        populated(&store, &model);
        let analyzer = ImpactAnalyzer::new(CodeIndex::new(&store, &model));

        let changed = [ChangedFile::new("auth/login.py", 400, 200)];
        let report = analyzer.find_related(&changed, 5).unwrap();

        // auth/session.py, billing/invoice.py, web/app.ts, big/module.py
        assert_eq!(report.related_files.len(), 4);
        assert_eq!(report.risk_score, 4);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert_eq!(report.reasons.len(), 2);
    }

    #[test]
    fn report_renders_in_every_format() {
        let report = ImpactReport {
            base: None,
            head: None,
            changed_files: vec![ChangedFile::new("a.py", 10, 2)],
            related_files: vec![
                RelatedFile {
                    file_path: "b.py".into(),
                    distance: 0.1,
                    chunk_id: "handler".into(),
                },
                RelatedFile {
                    file_path: "c.py".into(),
                    distance: 0.456,
                    chunk_id: "full".into(),
                },
            ],
            risk_score: 1,
            risk_level: RiskLevel::Low,
            reasons: vec!["Found 2 related file(s)".into()],
        }
        .with_base("main");

        let md = report.to_markdown();
        assert!(md.contains("**Base:** `main`"));
        assert!(md.contains("- `a.py` (+10, -2)"));
        assert!(md.contains("- `b.py` (handler) — 90% relevant"));
        assert!(md.contains("- `c.py` — 54% relevant"));

        let text = report.to_string();
        assert!(text.contains("Review against main"));
        assert!(text.contains("Risk: Low (score 1)"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["riskLevel"], "Low");
        assert_eq!(json["relatedFiles"][0]["filePath"], "b.py");
        assert_eq!(json["changedFiles"][0]["additions"], 10);
    }

    #[test]
    fn empty_report_says_no_impact() {
        let report = ImpactReport {
            base: None,
            head: None,
            changed_files: vec![],
            related_files: vec![],
            risk_score: 0,
            risk_level: RiskLevel::Low,
            reasons: vec![],
        };
        assert!(report.to_markdown().contains("No Hidden Impact Detected"));
        assert!(report.to_string().ends_with("No hidden impact detected."));
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("base").is_none());
        assert!(json.get("head").is_none());
    }

    #[test]
    fn report_names_branch_and_base() {
        let store = VectorStore::in_memory().unwrap();
        let model = EmbeddingModel::fallback(64);
        let analyzer = ImpactAnalyzer::new(CodeIndex::new(&store, &model));

        let report = analyzer
            .find_related(&[ChangedFile::new("a.py", 1, 0)], 5)
            .unwrap()
            .with_base("main")
            .with_head("feature/cart");

        assert!(report.to_string().starts_with("Comparing feature/cart → main"));
        assert!(report
            .to_markdown()
            .contains("**Comparing:** `feature/cart` → `main`"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["head"], "feature/cart");
        assert_eq!(json["base"], "main");
    }

    #[test]
    fn model_dimension_change_is_an_error_not_impact() {
        let store = VectorStore::in_memory().unwrap();
        let indexing_model = EmbeddingModel::fallback(8);
        let index = CodeIndex::new(&store, &indexing_model);
        for (path, body) in [
            ("a.ts", "export const a = 1;"),
            ("b.ts", "export const b = 2;"),
            ("c.ts", "export const c = 3;"),
            ("d.ts", "export const d = 4;"),
        ] {
            index.add_file(path, body, Metadata::new()).unwrap();
        }

        let narrower = EmbeddingModel::fallback(4);
        let analyzer = ImpactAnalyzer::new(CodeIndex::new(&store, &narrower));
        let err = analyzer
            .find_related(&[ChangedFile::new("a.ts", 2, 1)], 5)
            .unwrap_err();
        assert!(matches!(err, GhostError::Database(_)));
        assert!(err.to_string().contains("8-dimensional"), "unexpected error: {err}");
    }
}
