//! Hidden-impact review of a change set.
//!
//! - [`changes`] — which files a branch touches (`git2` tree diff or `--numstat` text)
//! - [`impact`] — files outside the change that the code index says are similar
//! - [`risk`] — a coarse Low/Medium/High score with reasons

pub mod changes;
pub mod impact;
pub mod risk;

pub use impact::{ImpactAnalyzer, ImpactReport, RelatedFile};
pub use risk::{assess_risk, RiskAssessment};
