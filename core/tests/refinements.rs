//! Refinement layer: event detection, per-type required checks, the
//! lookback window, idempotency, and the exclusion audit log.

use amlsim_core::alert::Alert;
use amlsim_core::config::{RefinementRule, ThresholdKind};
use amlsim_core::record::{Record, ReferenceData, Value, VerifiedEntity};
use amlsim_core::refinement_layer::{apply_refinements, detect_event, EventType};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap() + Duration::days(n)
}

fn txn(id: &str, customer: &str, d: i64, amount: f64, narrative: &str, beneficiary: &str) -> Record {
    let mut fields = BTreeMap::new();
    fields.insert("transaction_amount".to_string(), Value::Number(amount));
    fields.insert(
        "transaction_narrative".to_string(),
        Value::Text(narrative.to_string()),
    );
    fields.insert(
        "beneficiary_name".to_string(),
        Value::Text(beneficiary.to_string()),
    );
    Record {
        id: id.to_string(),
        owner_id: customer.to_string(),
        timestamp: day(d),
        fields,
    }
}

fn alert(id: &str, customer: &str, end_day: i64) -> Alert {
    Alert {
        id: id.to_string(),
        customer_id: customer.to_string(),
        scenario_id: "scn-1".to_string(),
        window_end_date: day(end_day),
        aggregated_value: 120_000.0,
        threshold_used: 100_000.0,
        threshold_type: ThresholdKind::Fixed,
        transaction_count: 4,
        involved_transaction_ids: Vec::new(),
        risk_score: 60,
        reason: "High value activity".to_string(),
        severity: "MEDIUM".to_string(),
        excluded: false,
        exclusion_reason: None,
        trigger_details: BTreeMap::new(),
    }
}

fn education_rule() -> RefinementRule {
    RefinementRule {
        rule_id: "rule-edu".to_string(),
        rule_type: "event_based".to_string(),
        excluded_events: vec![EventType::Education],
    }
}

fn university_whitelist() -> ReferenceData {
    ReferenceData {
        verified_entities: vec![VerifiedEntity {
            name: "National State University".to_string(),
            entity_type: "University".to_string(),
            active: true,
        }],
        ..ReferenceData::default()
    }
}

#[test]
fn keyword_detection_is_case_insensitive_and_ordered() {
    assert_eq!(detect_event("TUITION for spring"), Some(EventType::Education));
    assert_eq!(detect_event("Monthly EMI payment"), Some(EventType::Loan));
    assert_eq!(
        detect_event("Term deposit rollover"),
        Some(EventType::FixedDeposit)
    );
    // Education wins when keywords of several types co-occur.
    assert_eq!(
        detect_event("Student fee loan disbursement"),
        Some(EventType::Education)
    );
    assert_eq!(detect_event("Monthly rent"), None);
    assert_eq!(detect_event("   "), None);
}

#[test]
fn verified_education_under_the_cap_is_excluded() {
    let alerts = vec![alert("a-1", "c-1", 10)];
    let txns = vec![txn(
        "t-1",
        "c-1",
        5,
        30_000.0,
        "University tuition, semester 2",
        "State University",
    )];

    let (alerts, entries) = apply_refinements(
        alerts,
        &txns,
        &[education_rule()],
        &university_whitelist(),
    );

    assert!(alerts[0].excluded);
    assert_eq!(
        alerts[0].exclusion_reason.as_deref(),
        Some("Verified education transaction to State University")
    );
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.alert_id, "a-1");
    assert_eq!(entry.rule_id, "rule-edu");
    assert_eq!(
        entry.risk_flags_snapshot.get("event_type"),
        Some(&Value::Text("education".to_string()))
    );
    assert_eq!(
        entry.risk_flags_snapshot.get("amount"),
        Some(&Value::Number(30_000.0))
    );
    assert_eq!(
        entry.risk_flags_snapshot.get("verified"),
        Some(&Value::Bool(true))
    );
    assert_eq!(
        entry.risk_flags_snapshot.get("amount_reasonable"),
        Some(&Value::Bool(true))
    );
}

#[test]
fn education_over_the_cap_is_retained() {
    let alerts = vec![alert("a-1", "c-1", 10)];
    let txns = vec![txn(
        "t-1",
        "c-1",
        5,
        80_000.0,
        "University tuition",
        "State University",
    )];

    let (alerts, entries) = apply_refinements(
        alerts,
        &txns,
        &[education_rule()],
        &university_whitelist(),
    );

    assert!(!alerts[0].excluded, "80,000 exceeds the 50,000 cap");
    assert!(alerts[0].exclusion_reason.is_none());
    assert!(entries.is_empty(), "no suppression, no audit entry");
}

#[test]
fn unverified_or_inactive_university_does_not_suppress() {
    let txns = vec![txn(
        "t-1",
        "c-1",
        5,
        30_000.0,
        "University tuition",
        "Shady University",
    )];

    let (alerts, entries) = apply_refinements(
        vec![alert("a-1", "c-1", 10)],
        &txns,
        &[education_rule()],
        &ReferenceData::default(),
    );
    assert!(!alerts[0].excluded, "empty whitelist means unverified");
    assert!(entries.is_empty());

    let inactive = ReferenceData {
        verified_entities: vec![VerifiedEntity {
            name: "Shady University".to_string(),
            entity_type: "University".to_string(),
            active: false,
        }],
        ..ReferenceData::default()
    };
    let (alerts, entries) = apply_refinements(
        vec![alert("a-1", "c-1", 10)],
        &txns,
        &[education_rule()],
        &inactive,
    );
    assert!(!alerts[0].excluded, "inactive entities never verify");
    assert!(entries.is_empty());
}

#[test]
fn loan_needs_no_verification() {
    let alerts = vec![alert("a-1", "c-1", 10)];
    let txns = vec![txn(
        "t-1",
        "c-1",
        8,
        250_000.0,
        "Loan EMI repayment",
        "Some Bank",
    )];
    let rule = RefinementRule {
        rule_id: "rule-loan".to_string(),
        rule_type: "event_based".to_string(),
        excluded_events: vec![EventType::Loan],
    };

    let (alerts, entries) =
        apply_refinements(alerts, &txns, &[rule], &ReferenceData::default());

    assert!(alerts[0].excluded, "loans suppress on keyword match alone");
    assert_eq!(
        alerts[0].exclusion_reason.as_deref(),
        Some("Legitimate loan transaction")
    );
    assert_eq!(entries.len(), 1);
}

#[test]
fn only_listed_event_types_suppress() {
    // A loan transaction against a rule that only excludes education.
    let alerts = vec![alert("a-1", "c-1", 10)];
    let txns = vec![txn("t-1", "c-1", 5, 10_000.0, "Mortgage repayment", "Bank")];

    let (alerts, entries) = apply_refinements(
        alerts,
        &txns,
        &[education_rule()],
        &ReferenceData::default(),
    );
    assert!(!alerts[0].excluded);
    assert!(entries.is_empty());
}

#[test]
fn non_event_based_rules_are_ignored() {
    let alerts = vec![alert("a-1", "c-1", 10)];
    let txns = vec![txn(
        "t-1",
        "c-1",
        5,
        30_000.0,
        "University tuition",
        "State University",
    )];
    let rule = RefinementRule {
        rule_id: "rule-ml".to_string(),
        rule_type: "ml_model".to_string(),
        excluded_events: vec![EventType::Education],
    };

    let (alerts, entries) =
        apply_refinements(alerts, &txns, &[rule], &university_whitelist());
    assert!(!alerts[0].excluded, "unknown rule types are skipped");
    assert!(entries.is_empty());
}

#[test]
fn lookback_window_bounds_the_scan() {
    let rule = education_rule();
    let reference = university_whitelist();

    // Contributing transaction 40 days before the alert: out of scope.
    let stale = vec![txn(
        "t-1",
        "c-1",
        -30,
        30_000.0,
        "University tuition",
        "State University",
    )];
    let (alerts, _) =
        apply_refinements(vec![alert("a-1", "c-1", 10)], &stale, &[rule.clone()], &reference);
    assert!(!alerts[0].excluded, "outside the 30-day lookback");

    // A transaction after the window end never contributes either.
    let future = vec![txn(
        "t-2",
        "c-1",
        15,
        30_000.0,
        "University tuition",
        "State University",
    )];
    let (alerts, _) =
        apply_refinements(vec![alert("a-1", "c-1", 10)], &future, &[rule.clone()], &reference);
    assert!(!alerts[0].excluded, "after the alert date is out of scope");

    // Exactly 30 days back is inclusive.
    let boundary = vec![txn(
        "t-3",
        "c-1",
        -20,
        30_000.0,
        "University tuition",
        "State University",
    )];
    let (alerts, _) =
        apply_refinements(vec![alert("a-1", "c-1", 10)], &boundary, &[rule], &reference);
    assert!(alerts[0].excluded);
}

#[test]
fn refinement_is_idempotent() {
    let txns = vec![txn(
        "t-1",
        "c-1",
        5,
        30_000.0,
        "University tuition",
        "State University",
    )];
    let rules = vec![education_rule()];
    let reference = university_whitelist();

    let (alerts, first) =
        apply_refinements(vec![alert("a-1", "c-1", 10)], &txns, &rules, &reference);
    assert_eq!(first.len(), 1);

    let (alerts, second) = apply_refinements(alerts, &txns, &rules, &reference);
    assert!(alerts[0].excluded, "state is unchanged");
    assert!(
        second.is_empty(),
        "re-running the same rules adds no duplicate audit entries"
    );
}

#[test]
fn one_audit_entry_per_suppressed_alert() {
    // Two qualifying transactions; only the first match writes an entry.
    let txns = vec![
        txn("t-1", "c-1", 3, 20_000.0, "Tuition instalment 1", "State University"),
        txn("t-2", "c-1", 6, 20_000.0, "Tuition instalment 2", "State University"),
    ];

    let (alerts, entries) = apply_refinements(
        vec![alert("a-1", "c-1", 10)],
        &txns,
        &[education_rule()],
        &university_whitelist(),
    );
    assert!(alerts[0].excluded);
    assert_eq!(entries.len(), 1);
}

#[test]
fn alerts_for_other_customers_are_untouched() {
    let txns = vec![txn(
        "t-1",
        "c-1",
        5,
        30_000.0,
        "University tuition",
        "State University",
    )];

    let (alerts, entries) = apply_refinements(
        vec![alert("a-1", "c-1", 10), alert("a-2", "c-2", 10)],
        &txns,
        &[education_rule()],
        &university_whitelist(),
    );
    assert!(alerts[0].excluded);
    assert!(!alerts[1].excluded, "c-2 has no qualifying transaction");
    assert_eq!(entries.len(), 1);
}
