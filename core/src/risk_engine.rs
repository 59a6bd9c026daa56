//! Risk engine — pre-deployment red-teaming of a proposed refinement.
//!
//! Answers: "if this rule list were deployed, how much risk would the
//! suppressed alerts carry?" It reuses the refinement layer's keyword
//! classifier against each baseline alert's narrative, SIMULATES which
//! alerts the rules would exclude, and scores each would-be exclusion from
//! a fixed weight table. Nothing is mutated: the baseline alert set and the
//! reference snapshot are read-only, so this runs safely alongside live
//! simulation runs.
//!
//! Risk-level policy AT THIS CALL SITE is purely score-based (the comparison
//! engine instead escalates on any nonzero removal count); the two ladders
//! are intentionally distinct.

use crate::{
    alert::Alert,
    comparison_engine::RiskLevel,
    config::RefinementRule,
    record::ReferenceData,
    refinement_layer::{detect_event, EventType, BENEFICIARY_FIELD, EDUCATION_AMOUNT_CAP},
};
use serde::{Deserialize, Serialize};

// ── Scoring weights ──────────────────────────────────────────────────────────

const EDUCATION_OVER_CAP_POINTS: f64 = 15.0;
const CRYPTO_OVER_CAP_POINTS: f64 = 20.0;
const CRYPTO_AMOUNT_CAP: f64 = 10_000.0;
const UNVERIFIED_BENEFICIARY_POINTS: f64 = 25.0;
const VERIFIED_BENEFICIARY_CREDIT: f64 = 5.0;
const PEP_POINTS: f64 = 25.0;
const ADVERSE_MEDIA_POINTS: f64 = 20.0;
const HIGH_RISK_OCCUPATION_POINTS: f64 = 10.0;
const PRIOR_SAR_POINTS: f64 = 10.0;

const MAX_SAMPLE_EXPLOITS: usize = 3;

const CRITICAL_CUTOFF: f64 = 60.0;
const DANGEROUS_CUTOFF: f64 = 30.0;

/// Keyword that routes an alert narrative to the crypto category.
const CRYPTO_MARKER: &str = "crypto";

/// Amount-cap and verification policy per exclusion category.
struct CategoryPolicy {
    cap: f64,
    over_cap_points: f64,
    /// Whitelist entity type for beneficiary verification, when the
    /// category requires one.
    entity_type: Option<&'static str>,
    label: &'static str,
}

fn category_policy(event: Option<EventType>, narrative_lower: &str) -> Option<CategoryPolicy> {
    if narrative_lower.contains(CRYPTO_MARKER) {
        return Some(CategoryPolicy {
            cap: CRYPTO_AMOUNT_CAP,
            over_cap_points: CRYPTO_OVER_CAP_POINTS,
            entity_type: Some("CryptoExchange"),
            label: "Crypto",
        });
    }
    match event {
        Some(EventType::Education) => Some(CategoryPolicy {
            cap: EDUCATION_AMOUNT_CAP,
            over_cap_points: EDUCATION_OVER_CAP_POINTS,
            entity_type: Some("University"),
            label: "Education",
        }),
        _ => None,
    }
}

// ── Report model ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    /// 0..=100; the sum of per-alert scores, capped.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    /// How many baseline alerts the hypothetical rules would suppress.
    pub excluded_count: usize,
    pub sample_exploits: Vec<String>,
}

impl RiskReport {
    fn safe() -> Self {
        Self {
            risk_score: 0.0,
            risk_level: RiskLevel::Safe,
            excluded_count: 0,
            sample_exploits: Vec::new(),
        }
    }
}

struct WouldBeExclusion {
    score: f64,
    rule_id: String,
    factors: Vec<String>,
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Score the risk a hypothetical refinement rule list would suppress if
/// deployed against `baseline_alerts`. Pure simulation; nothing is written.
pub fn analyze_refinement_risk(
    baseline_alerts: &[Alert],
    hypothetical_rules: &[RefinementRule],
    reference: &ReferenceData,
) -> RiskReport {
    if baseline_alerts.is_empty() {
        log::info!("risk analysis: no baseline alerts to analyze");
        return RiskReport::safe();
    }

    let mut exclusions: Vec<WouldBeExclusion> = Vec::new();
    let mut total = 0.0;

    for alert in baseline_alerts {
        let narrative_lower = alert.reason.to_lowercase();
        let detected = detect_event(&alert.reason);

        for rule in hypothetical_rules {
            if !rule.is_event_based() {
                continue;
            }
            let Some(event) = detected else { break };
            if !rule.excluded_events.contains(&event) {
                continue;
            }

            let (score, factors) = score_exclusion(alert, event, &narrative_lower, reference);
            total += score;
            exclusions.push(WouldBeExclusion {
                score,
                rule_id: rule.rule_id.clone(),
                factors,
            });
            // One exclusion per alert is enough.
            break;
        }
    }

    if exclusions.is_empty() {
        return RiskReport::safe();
    }

    let risk_score = round1(total.min(100.0));
    let risk_level = risk_level_for(risk_score);

    exclusions.sort_by(|a, b| b.score.total_cmp(&a.score));
    let sample_exploits = exclusions
        .iter()
        .take(MAX_SAMPLE_EXPLOITS)
        .map(|e| {
            let lead = e
                .factors
                .first()
                .map(String::as_str)
                .unwrap_or("Generic gap");
            if e.factors.is_empty() {
                format!("Exploit: {lead} — excluded by rule '{}'", e.rule_id)
            } else {
                format!(
                    "Exploit: {lead} — excluded by rule '{}' ({})",
                    e.rule_id,
                    e.factors.join(", ")
                )
            }
        })
        .collect();

    log::info!(
        "risk analysis: {} would-be exclusions, score {:.1}, level {}",
        exclusions.len(),
        risk_score,
        risk_level
    );

    RiskReport {
        risk_score,
        risk_level,
        excluded_count: exclusions.len(),
        sample_exploits,
    }
}

/// Weighted score for one would-be-excluded alert, clamped at zero.
fn score_exclusion(
    alert: &Alert,
    event: EventType,
    narrative_lower: &str,
    reference: &ReferenceData,
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut factors = Vec::new();

    let policy = category_policy(Some(event), narrative_lower);

    // Factor A: amount over the category's reasonableness cap.
    if let Some(policy) = &policy {
        let amount = alert.aggregated_value;
        if amount > policy.cap {
            score += policy.over_cap_points;
            factors.push(format!("High amount for {}: {:.2}", policy.label, amount));
        }

        // Factor B: beneficiary verification, when the category requires it
        // and the alert carries a beneficiary.
        if let (Some(entity_type), Some(beneficiary)) =
            (policy.entity_type, alert.detail_text(BENEFICIARY_FIELD))
        {
            if reference.is_verified(beneficiary, entity_type) {
                score -= VERIFIED_BENEFICIARY_CREDIT;
            } else {
                score += UNVERIFIED_BENEFICIARY_POINTS;
                factors.push(format!(
                    "Unverified {entity_type} beneficiary: {beneficiary}"
                ));
            }
        }
    }

    // Factor C: customer risk flags, each contributing independently.
    if let Some(profile) = reference.risk_profile(&alert.customer_id) {
        if profile.is_pep {
            score += PEP_POINTS;
            factors.push("Customer is PEP".to_string());
        }
        if profile.has_adverse_media {
            score += ADVERSE_MEDIA_POINTS;
            factors.push("Adverse media found".to_string());
        }
        if profile.high_risk_occupation {
            score += HIGH_RISK_OCCUPATION_POINTS;
            factors.push("High-risk occupation".to_string());
        }
        if profile.previous_sar_count > 0 {
            score += PRIOR_SAR_POINTS * f64::from(profile.previous_sar_count);
            factors.push(format!("{} previous SARs", profile.previous_sar_count));
        }
    }

    (score.max(0.0), factors)
}

fn risk_level_for(score: f64) -> RiskLevel {
    if score > CRITICAL_CUTOFF {
        RiskLevel::Critical
    } else if score > DANGEROUS_CUTOFF {
        RiskLevel::Dangerous
    } else if score > 0.0 {
        RiskLevel::Caution
    } else {
        RiskLevel::Safe
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
