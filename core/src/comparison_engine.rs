//! Comparison engine — diff between two already-computed alert sets.
//!
//! Read-only and stateless: both inputs are immutable, finalized alert sets
//! from separate runs, so this can be invoked concurrently with live runs.
//!
//! Risk-level policy AT THIS CALL SITE: any removed customer escalates to
//! CRITICAL outright; only a removal-free comparison consults the score
//! cutoffs. The red-team engine uses a different, purely score-based ladder
//! (see `risk_engine`) — the two policies are intentionally distinct.

use crate::{alert::Alert, types::CustomerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ── Constants ────────────────────────────────────────────────────────────────

/// How many of the highest-risk removed entries feed the mean score.
const TOP_RISK_SAMPLE: usize = 10;
/// Sample-exploit narratives are capped at this many entries.
const MAX_SAMPLE_EXPLOITS: usize = 3;

const DANGEROUS_SCORE_CUTOFF: f64 = 50.0;
const CAUTION_SCORE_CUTOFF: f64 = 25.0;

// ── Report model ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Caution,
    Dangerous,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Caution => "CAUTION",
            RiskLevel::Dangerous => "DANGEROUS",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub baseline_count: usize,
    pub refined_count: usize,
    /// `baseline_count - refined_count`; negative when the candidate grew.
    pub net_change: i64,
    /// Percentage of baseline alerts removed; 0 when the baseline is empty.
    pub reduction_pct: f64,
    pub maintained_customers: usize,
    pub removed_customers: usize,
    pub added_customers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Removed,
    Maintained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffEntry {
    pub customer_id: CustomerId,
    pub status: DiffStatus,
    pub risk_score: u8,
    /// Candidate risk minus baseline risk; only nonzero for maintained rows.
    pub risk_change: i16,
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalysis {
    /// Mean of the top risk scores among removed entries; 0 when none.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub total_suppressions: usize,
    pub sample_exploits: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub summary: ComparisonSummary,
    pub granular_diff: Vec<DiffEntry>,
    pub risk_analysis: RiskAnalysis,
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Compare a baseline alert set against a candidate (refined) set.
pub fn compare_alert_sets(baseline: &[Alert], candidate: &[Alert]) -> ComparisonReport {
    let baseline_map: HashMap<&str, &Alert> =
        baseline.iter().map(|a| (a.customer_id.as_str(), a)).collect();
    let candidate_map: HashMap<&str, &Alert> =
        candidate.iter().map(|a| (a.customer_id.as_str(), a)).collect();

    let mut all_customers: Vec<&str> = baseline_map
        .keys()
        .chain(candidate_map.keys())
        .copied()
        .collect();
    all_customers.sort_unstable();
    all_customers.dedup();

    let mut maintained = 0usize;
    let mut removed = 0usize;
    let mut added = 0usize;
    let mut granular_diff = Vec::new();

    for customer_id in all_customers {
        let in_baseline = baseline_map.get(customer_id).copied();
        let in_candidate = candidate_map.get(customer_id).copied();

        let (status, risk_change) = match (in_baseline, in_candidate) {
            (Some(b), Some(c)) => {
                maintained += 1;
                (
                    DiffStatus::Maintained,
                    i16::from(c.risk_score) - i16::from(b.risk_score),
                )
            }
            (Some(_), None) => {
                removed += 1;
                (DiffStatus::Removed, 0)
            }
            (None, Some(_)) => {
                added += 1;
                (DiffStatus::Added, 0)
            }
            (None, None) => continue,
        };

        // Unchanged maintained rows stay out of the diff: comparing a run
        // against itself yields an empty granular diff.
        if status == DiffStatus::Maintained && risk_change == 0 {
            continue;
        }

        // The candidate's alert describes the current state when it exists.
        let Some(display) = in_candidate.or(in_baseline) else {
            continue;
        };
        granular_diff.push(DiffEntry {
            customer_id: customer_id.to_string(),
            status,
            risk_score: display.risk_score,
            risk_change,
            amount: display.aggregated_value,
            reason: display.reason.clone(),
        });
    }

    granular_diff.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });

    let baseline_count = baseline.len();
    let refined_count = candidate.len();
    let net_change = baseline_count as i64 - refined_count as i64;
    let reduction_pct = if baseline_count > 0 {
        round2(net_change as f64 / baseline_count as f64 * 100.0)
    } else {
        0.0
    };

    let summary = ComparisonSummary {
        baseline_count,
        refined_count,
        net_change,
        reduction_pct,
        maintained_customers: maintained,
        removed_customers: removed,
        added_customers: added,
    };

    let risk_analysis = analyze_removed(&granular_diff);

    log::info!(
        "comparison: baseline={} candidate={} removed={} level={}",
        baseline_count,
        refined_count,
        removed,
        risk_analysis.risk_level
    );

    ComparisonReport {
        summary,
        granular_diff,
        risk_analysis,
    }
}

fn analyze_removed(granular_diff: &[DiffEntry]) -> RiskAnalysis {
    // Already sorted by risk descending, so the first N removed entries are
    // the top-risk ones.
    let removed: Vec<&DiffEntry> = granular_diff
        .iter()
        .filter(|e| e.status == DiffStatus::Removed)
        .collect();

    let top_scores: Vec<f64> = removed
        .iter()
        .take(TOP_RISK_SAMPLE)
        .map(|e| f64::from(e.risk_score))
        .collect();
    let risk_score = if top_scores.is_empty() {
        0.0
    } else {
        round2(top_scores.iter().sum::<f64>() / top_scores.len() as f64)
    };

    // Any suppression at all is treated as the highest urgency signal at
    // this call site, independent of score.
    let risk_level = if !removed.is_empty() {
        RiskLevel::Critical
    } else if risk_score >= DANGEROUS_SCORE_CUTOFF {
        RiskLevel::Dangerous
    } else if risk_score >= CAUTION_SCORE_CUTOFF {
        RiskLevel::Caution
    } else {
        RiskLevel::Safe
    };

    let sample_exploits = removed
        .iter()
        .take(MAX_SAMPLE_EXPLOITS)
        .map(|e| {
            format!(
                "Customer {}: ${:.0} suppressed (score: {})",
                e.customer_id, e.amount, e.risk_score
            )
        })
        .collect();

    RiskAnalysis {
        risk_score,
        risk_level,
        total_suppressions: removed.len(),
        sample_exploits,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
