use ghoststack_core::RiskLevel;
use serde::{Deserialize, Serialize};

/// Outcome of [`assess_risk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// Accumulated score, 0–6.
    pub score: u32,
    /// Level derived from `score`.
    pub level: RiskLevel,
    /// One human-readable reason per contributing condition.
    pub reasons: Vec<String>,
}

/// Score a change set by size, spread, and hidden impact.
///
/// | Condition | +2 | +1 |
/// |-----------|----|----|
/// | lines changed | > 500 | > 100 |
/// | files changed | > 10 | > 5 |
/// | related files outside the change | > 3 | > 0 |
///
/// # Examples
///
/// ```
/// use ghoststack_core::RiskLevel;
/// use ghoststack_review::risk::assess_risk;
///
/// let risk = assess_risk(600, 12, 4);
/// assert_eq!(risk.score, 6);
/// assert_eq!(risk.level, RiskLevel::High);
/// assert_eq!(risk.reasons.len(), 3);
///
/// let quiet = assess_risk(20, 1, 0);
/// assert_eq!(quiet.level, RiskLevel::Low);
/// assert!(quiet.reasons.is_empty());
/// ```
pub fn assess_risk(total_lines: u64, changed_files: usize, related_files: usize) -> RiskAssessment {
    let mut score = 0;
    let mut reasons = Vec::new();

    if total_lines > 500 {
        score += 2;
        reasons.push(format!("Large changeset ({total_lines} lines)"));
    } else if total_lines > 100 {
        score += 1;
        reasons.push(format!("Moderate changeset ({total_lines} lines)"));
    }

    if changed_files > 10 {
        score += 2;
        reasons.push(format!("Many files changed ({changed_files})"));
    } else if changed_files > 5 {
        score += 1;
        reasons.push(format!("Several files changed ({changed_files})"));
    }

    if related_files > 3 {
        score += 2;
        reasons.push(format!(
            "Found {related_files} potentially impacted files not in diff"
        ));
    } else if related_files > 0 {
        score += 1;
        reasons.push(format!("Found {related_files} related file(s)"));
    }

    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        reasons,
    }
}
