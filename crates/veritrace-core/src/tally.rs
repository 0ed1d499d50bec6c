//! Verdict tally: aggregates per-check verdicts into run totals.
//!
//! The overall status follows strict priority, not a vote:
//! 1. If ANY verdict is NON-COMPLIANT, the audit is NON-COMPLIANT
//! 2. Else if ANY verdict is NEEDS_REVIEW (or there are none), NEEDS_REVIEW
//! 3. Else COMPLIANT

use serde::{Deserialize, Serialize};

use crate::types::{ComplianceVerdict, VerdictCategory};

/// Totals over a verdict sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerdictTally {
    pub total: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub needs_review: usize,

    /// Mean confidence, 0.0 when there are no verdicts
    pub mean_confidence: f64,

    /// Rules judged NON-COMPLIANT, in audit order
    #[serde(default)]
    pub non_compliant_rules: Vec<String>,
}

impl VerdictTally {
    pub fn from_verdicts(verdicts: &[ComplianceVerdict]) -> Self {
        let mut tally = Self {
            total: verdicts.len(),
            ..Self::default()
        };

        for verdict in verdicts {
            match verdict.verdict {
                VerdictCategory::Compliant => tally.compliant += 1,
                VerdictCategory::NonCompliant => {
                    tally.non_compliant += 1;
                    tally.non_compliant_rules.push(verdict.policy_rule.clone());
                }
                VerdictCategory::NeedsReview => tally.needs_review += 1,
            }
        }

        if !verdicts.is_empty() {
            let sum: f64 = verdicts.iter().map(|v| v.confidence).sum();
            tally.mean_confidence = (sum / verdicts.len() as f64).clamp(0.0, 1.0);
        }

        tally
    }

    /// Count for one category.
    pub fn count(&self, category: VerdictCategory) -> usize {
        match category {
            VerdictCategory::Compliant => self.compliant,
            VerdictCategory::NonCompliant => self.non_compliant,
            VerdictCategory::NeedsReview => self.needs_review,
        }
    }

    /// Overall status of the audit.
    pub fn overall(&self) -> VerdictCategory {
        if self.non_compliant > 0 {
            VerdictCategory::NonCompliant
        } else if self.needs_review > 0 || self.total == 0 {
            VerdictCategory::NeedsReview
        } else {
            VerdictCategory::Compliant
        }
    }

    /// One-line human-readable summary.
    pub fn headline(&self) -> String {
        format!(
            "{} checks: {} compliant, {} non-compliant, {} needing review (mean confidence {:.2}). Overall: {}",
            self.total,
            self.compliant,
            self.non_compliant,
            self.needs_review,
            self.mean_confidence,
            self.overall()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(rule: &str, category: VerdictCategory, confidence: f64) -> ComplianceVerdict {
        ComplianceVerdict {
            policy_rule: rule.to_string(),
            document_id: "DOC".to_string(),
            verdict: category,
            reasoning: "because".to_string(),
            confidence,
        }
    }

    #[test]
    fn test_counts_and_mean() {
        let verdicts = vec![
            verdict("a", VerdictCategory::Compliant, 0.9),
            verdict("b", VerdictCategory::NonCompliant, 0.8),
            verdict("c", VerdictCategory::NeedsReview, 0.4),
            verdict("d", VerdictCategory::NonCompliant, 0.5),
        ];
        let tally = VerdictTally::from_verdicts(&verdicts);

        assert_eq!(tally.total, 4);
        assert_eq!(tally.count(VerdictCategory::Compliant), 1);
        assert_eq!(tally.count(VerdictCategory::NonCompliant), 2);
        assert_eq!(tally.count(VerdictCategory::NeedsReview), 1);
        assert!((tally.mean_confidence - 0.65).abs() < 1e-9);
        assert_eq!(tally.non_compliant_rules, vec!["b", "d"]);
    }

    #[test]
    fn test_non_compliant_takes_priority() {
        let verdicts = vec![
            verdict("a", VerdictCategory::NeedsReview, 0.9),
            verdict("b", VerdictCategory::NonCompliant, 0.9),
        ];
        assert_eq!(
            VerdictTally::from_verdicts(&verdicts).overall(),
            VerdictCategory::NonCompliant
        );
    }

    #[test]
    fn test_all_compliant() {
        let verdicts = vec![verdict("a", VerdictCategory::Compliant, 1.0)];
        let tally = VerdictTally::from_verdicts(&verdicts);
        assert_eq!(tally.overall(), VerdictCategory::Compliant);
        assert!(tally.headline().contains("Overall: COMPLIANT"));
    }

    #[test]
    fn test_empty_needs_review() {
        let tally = VerdictTally::from_verdicts(&[]);
        assert_eq!(tally.total, 0);
        assert_eq!(tally.mean_confidence, 0.0);
        assert_eq!(tally.overall(), VerdictCategory::NeedsReview);
    }
}
