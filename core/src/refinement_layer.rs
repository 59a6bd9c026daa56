//! Refinement layer — event-context detection, suppression policy, and the
//! exclusion audit log.
//!
//! An alert moves `pending → evaluated → {excluded | retained}`:
//!   1. The event detector classifies a transaction's free-text narrative
//!      into an event type by keyword match.
//!   2. The per-type required checks run (see [`RequiredChecks`] — a lookup
//!      table, so new event types declare their own policy instead of
//!      growing ad hoc branches).
//!   3. The first contributing transaction that passes both steps for an
//!      event type named in the rule's `excluded_events` suppresses the
//!      alert, with a human-readable reason and exactly one audit entry.
//!
//! Idempotent: an already-excluded alert is never re-evaluated, so re-running
//! a rule adds no duplicate audit entries.

use crate::{
    alert::{Alert, ExclusionLogEntry},
    config::RefinementRule,
    record::{Record, ReferenceData, Value},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

// ── Constants ────────────────────────────────────────────────────────────────

const EDUCATION_KEYWORDS: &[&str] = &[
    "university",
    "tuition",
    "education",
    "school",
    "college",
    "student fee",
    "semester",
];
const LOAN_KEYWORDS: &[&str] = &["loan", "emi", "mortgage", "repayment", "installment", "financing"];
const FIXED_DEPOSIT_KEYWORDS: &[&str] = &[
    "fixed deposit",
    "fd",
    "term deposit",
    "investment",
    "fd maturity",
];

/// Reasonableness cap for education payments.
pub const EDUCATION_AMOUNT_CAP: f64 = 50_000.0;

/// How far back from the alert date contributing transactions are scanned.
const LOOKBACK_DAYS: i64 = 30;

/// Transaction field names the detector reads.
pub const NARRATIVE_FIELD: &str = "transaction_narrative";
pub const AMOUNT_FIELD: &str = "transaction_amount";
pub const BENEFICIARY_FIELD: &str = "beneficiary_name";

// ── Event types and policy table ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Education,
    Loan,
    FixedDeposit,
}

/// Checks an event type must pass before it can suppress an alert.
///
/// The asymmetry between event types is deliberate product policy: education
/// payments need a whitelisted university AND a reasonable amount, while loan
/// and fixed-deposit narratives suppress on match alone.
#[derive(Debug, Clone, Copy)]
pub struct RequiredChecks {
    /// Whitelist entity type the beneficiary must verify against, if any.
    pub verification_entity_type: Option<&'static str>,
    /// Maximum reasonable amount, if any.
    pub amount_cap: Option<f64>,
}

impl EventType {
    pub fn label(self) -> &'static str {
        match self {
            EventType::Education => "education",
            EventType::Loan => "loan",
            EventType::FixedDeposit => "fixed_deposit",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            EventType::Education => EDUCATION_KEYWORDS,
            EventType::Loan => LOAN_KEYWORDS,
            EventType::FixedDeposit => FIXED_DEPOSIT_KEYWORDS,
        }
    }

    /// The declarative policy table.
    pub fn required_checks(self) -> RequiredChecks {
        match self {
            EventType::Education => RequiredChecks {
                verification_entity_type: Some("University"),
                amount_cap: Some(EDUCATION_AMOUNT_CAP),
            },
            EventType::Loan | EventType::FixedDeposit => RequiredChecks {
                verification_entity_type: None,
                amount_cap: None,
            },
        }
    }
}

/// Classify a narrative by case-insensitive keyword substring match.
/// Detection order is fixed: education, then loan, then fixed deposit.
pub fn detect_event(narrative: &str) -> Option<EventType> {
    if narrative.trim().is_empty() {
        return None;
    }
    let lower = narrative.to_lowercase();
    [EventType::Education, EventType::Loan, EventType::FixedDeposit]
        .into_iter()
        .find(|event| event.keywords().iter().any(|kw| lower.contains(kw)))
}

/// A detected event with its verification outcome.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event_type: EventType,
    pub verified: bool,
    pub amount_reasonable: bool,
}

impl EventContext {
    /// Whether the event satisfies its type's required checks.
    pub fn passes_checks(&self) -> bool {
        self.verified && self.amount_reasonable
    }
}

/// Detect an event in a transaction narrative and run its required checks.
pub fn detect_event_context(
    narrative: &str,
    amount: f64,
    beneficiary: &str,
    reference: &ReferenceData,
) -> Option<EventContext> {
    let event_type = detect_event(narrative)?;
    let checks = event_type.required_checks();

    let verified = match checks.verification_entity_type {
        Some(entity_type) => reference.is_verified(beneficiary, entity_type),
        None => true,
    };
    let amount_reasonable = match checks.amount_cap {
        Some(cap) => amount <= cap,
        None => true,
    };

    Some(EventContext {
        event_type,
        verified,
        amount_reasonable,
    })
}

// ── Suppression ──────────────────────────────────────────────────────────────

/// Apply event-based refinement rules to an alert set.
///
/// Returns the updated alerts together with the audit entries written for
/// every suppression — one entry per (alert, rule) that triggered. Callers
/// must persist an alert and its entries transactionally.
pub fn apply_refinements(
    mut alerts: Vec<Alert>,
    transactions: &[Record],
    rules: &[RefinementRule],
    reference: &ReferenceData,
) -> (Vec<Alert>, Vec<ExclusionLogEntry>) {
    let mut log_entries = Vec::new();
    if alerts.is_empty() || rules.is_empty() {
        return (alerts, log_entries);
    }

    let mut by_customer: HashMap<&str, Vec<&Record>> = HashMap::new();
    for txn in transactions {
        by_customer.entry(txn.owner_id.as_str()).or_default().push(txn);
    }

    for rule in rules {
        if !rule.is_event_based() || rule.excluded_events.is_empty() {
            continue;
        }

        for alert in &mut alerts {
            if alert.excluded {
                continue;
            }

            let window_start = alert.window_end_date - Duration::days(LOOKBACK_DAYS);
            let candidates = by_customer
                .get(alert.customer_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();

            for txn in candidates {
                if txn.timestamp < window_start || txn.timestamp > alert.window_end_date {
                    continue;
                }

                let narrative = txn.text_field(NARRATIVE_FIELD);
                let amount = txn.numeric_field(AMOUNT_FIELD);
                let beneficiary = txn.text_field(BENEFICIARY_FIELD);

                let Some(context) =
                    detect_event_context(&narrative, amount, &beneficiary, reference)
                else {
                    continue;
                };
                if !rule.excluded_events.contains(&context.event_type) {
                    continue;
                }
                if !context.passes_checks() {
                    continue;
                }

                let reason = exclusion_reason(&context, &beneficiary);
                alert.excluded = true;
                alert.exclusion_reason = Some(reason.clone());

                log_entries.push(ExclusionLogEntry {
                    id: Uuid::new_v4().to_string(),
                    alert_id: alert.id.clone(),
                    rule_id: rule.rule_id.clone(),
                    reason: reason.clone(),
                    risk_flags_snapshot: risk_flags(&context, amount, &beneficiary),
                    timestamp: chrono::Utc::now(),
                });

                log::info!(
                    "alert {} excluded by rule {}: {}",
                    alert.id,
                    rule.rule_id,
                    reason
                );
                break;
            }
        }
    }

    (alerts, log_entries)
}

fn exclusion_reason(context: &EventContext, beneficiary: &str) -> String {
    if context.event_type.required_checks().verification_entity_type.is_some() {
        format!(
            "Verified {} transaction to {}",
            context.event_type.label(),
            beneficiary
        )
    } else {
        format!("Legitimate {} transaction", context.event_type.label())
    }
}

/// Snapshot of the deciding risk flags, frozen into the audit entry.
fn risk_flags(context: &EventContext, amount: f64, beneficiary: &str) -> BTreeMap<String, Value> {
    let mut flags = BTreeMap::new();
    flags.insert(
        "event_type".to_string(),
        Value::Text(context.event_type.label().to_string()),
    );
    flags.insert("amount".to_string(), Value::Number(amount));
    flags.insert(
        "beneficiary".to_string(),
        Value::Text(beneficiary.to_string()),
    );
    flags.insert("verified".to_string(), Value::Bool(context.verified));
    flags.insert(
        "amount_reasonable".to_string(),
        Value::Bool(context.amount_reasonable),
    );
    flags
}
