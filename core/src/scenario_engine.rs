//! Scenario execution engine — the heart of the pipeline.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Schema snapshot  (field routing for filters)
//!   2. Filter stage     (predicates over transaction + customer fields)
//!   3. Aggregation      (rolling-window peak scan per customer)
//!   4. Threshold        (fixed / dynamic / segment, per customer)
//!   5. Condition        (aggregate vs threshold, optional count gate)
//!   6. Alert builder    (risk score, narrative, provenance)
//!
//! `execute_scenario` is a pure function over in-memory inputs: no I/O, no
//! shared mutable state. Refinements are applied separately (see
//! `refinement_layer`) so their audit entries are never silently dropped;
//! `execute_run` wires both together for multi-scenario runs.

use crate::{
    aggregation_stage::{aggregate_peak_windows, WindowAggregate},
    alert::{Alert, ExclusionLogEntry},
    config::{RuleConfig, ThresholdKind, ThresholdSpec},
    error::{EngineError, EngineResult},
    filter_stage::apply_filters,
    record::{FieldSchema, Record, ReferenceData, Value},
    refinement_layer::apply_refinements,
    threshold_stage::resolve_threshold,
    types::ScenarioId,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Fallback risk score when the threshold is zero and the ratio is undefined.
const DEFAULT_RISK_SCORE: u8 = 50;

/// Execute one scenario against an in-memory dataset. Returns the raw alert
/// set; refinements have not been applied.
pub fn execute_scenario(
    config: &RuleConfig,
    transactions: &[Record],
    customers: &[Record],
    _reference: &ReferenceData,
) -> EngineResult<Vec<Alert>> {
    config.validate()?;

    let schema = FieldSchema::from_records(transactions, customers);
    let customers_by_id: HashMap<&str, &Record> =
        customers.iter().map(|c| (c.id.as_str(), c)).collect();

    // Stage 2: filters. An empty result short-circuits with zero alerts.
    let filtered = apply_filters(transactions, &customers_by_id, &config.filters, &schema);
    if filtered.is_empty() {
        log::info!(
            "scenario '{}': all {} transactions filtered out, no alerts",
            config.id,
            transactions.len()
        );
        return Ok(Vec::new());
    }
    log::debug!(
        "scenario '{}': {} of {} transactions pass filters",
        config.id,
        filtered.len(),
        transactions.len()
    );

    // Stage 3: rolling-window peak scan.
    let aggregates = aggregate_peak_windows(&filtered, &config.aggregation);

    // Stages 4-6: threshold, condition, alert builder.
    let mut alerts = Vec::new();
    let mut dedup_seen: HashSet<(String, NaiveDate)> = HashSet::new();

    for aggregate in aggregates {
        if let Some(count_threshold) = &config.count_threshold {
            if aggregate.transaction_count < count_threshold.min_transactions {
                continue;
            }
        }

        let customer = customers_by_id.get(aggregate.customer_id.as_str()).copied();
        let (threshold, threshold_kind) = resolve_threshold(&config.threshold, customer);

        if !condition_fires(aggregate.aggregated_value, threshold) {
            continue;
        }

        // Dedup invariant: one alert per (customer, window-end date, scenario).
        let dedup_key = (
            aggregate.customer_id.clone(),
            aggregate.window_end_date.date_naive(),
        );
        if !dedup_seen.insert(dedup_key) {
            log::warn!(
                "scenario '{}': duplicate window for customer {} on {}, alert skipped",
                config.id,
                aggregate.customer_id,
                aggregate.window_end_date.date_naive()
            );
            continue;
        }

        alerts.push(build_alert(
            config,
            &aggregate,
            threshold,
            threshold_kind,
            customer,
        ));
    }

    log::info!(
        "scenario '{}': {} alerts generated",
        config.id,
        alerts.len()
    );
    Ok(alerts)
}

/// The alert condition: aggregate at or above threshold. The degenerate
/// zero-on-zero case (unset/zero threshold, zero activity) never fires.
fn condition_fires(aggregated_value: f64, threshold: f64) -> bool {
    if threshold <= 0.0 && aggregated_value <= 0.0 {
        return false;
    }
    aggregated_value >= threshold
}

fn build_alert(
    config: &RuleConfig,
    aggregate: &WindowAggregate,
    threshold: f64,
    threshold_kind: ThresholdKind,
    customer: Option<&Record>,
) -> Alert {
    let risk_score = if threshold > 0.0 {
        ((aggregate.aggregated_value / threshold * 50.0).round() as u64).min(100) as u8
    } else {
        DEFAULT_RISK_SCORE
    };

    let reason = trigger_reason(config, aggregate, threshold, threshold_kind, customer);

    let mut trigger_details = BTreeMap::new();
    trigger_details.insert(
        "aggregated_value".to_string(),
        Value::Number(aggregate.aggregated_value),
    );
    trigger_details.insert(
        "aggregation_function".to_string(),
        Value::Text(config.aggregation.function.label().to_string()),
    );
    trigger_details.insert(
        "aggregation_field".to_string(),
        Value::Text(config.aggregation.field.clone()),
    );
    trigger_details.insert(
        "rolling_window_days".to_string(),
        Value::Number(f64::from(config.aggregation.window_days)),
    );
    trigger_details.insert("threshold_used".to_string(), Value::Number(threshold));
    trigger_details.insert(
        "threshold_type".to_string(),
        Value::Text(threshold_kind.to_string()),
    );
    trigger_details.insert(
        "transaction_count".to_string(),
        Value::Number(aggregate.transaction_count as f64),
    );

    Alert {
        id: Uuid::new_v4().to_string(),
        customer_id: aggregate.customer_id.clone(),
        scenario_id: config.id.clone(),
        window_end_date: aggregate.window_end_date,
        aggregated_value: aggregate.aggregated_value,
        threshold_used: threshold,
        threshold_type: threshold_kind,
        transaction_count: aggregate.transaction_count,
        involved_transaction_ids: aggregate.involved_transaction_ids.clone(),
        risk_score,
        reason,
        severity: config.alert_metadata.severity.clone(),
        excluded: false,
        exclusion_reason: None,
        trigger_details,
    }
}

/// Human-readable narrative stating the aggregation, window, and threshold
/// basis. Wording varies by threshold type for transparency.
fn trigger_reason(
    config: &RuleConfig,
    aggregate: &WindowAggregate,
    threshold: f64,
    threshold_kind: ThresholdKind,
    customer: Option<&Record>,
) -> String {
    let mut reason = format!(
        "Customer {} triggered '{}'. {}({}): {:.2} across {} transactions in a {}-day window. ",
        aggregate.customer_id,
        config.name,
        config.aggregation.function.label(),
        config.aggregation.field,
        aggregate.aggregated_value,
        aggregate.transaction_count,
        config.aggregation.window_days,
    );

    match (&config.threshold, threshold_kind) {
        (
            ThresholdSpec::Dynamic {
                reference_field,
                formula,
                ..
            },
            ThresholdKind::Dynamic,
        ) => {
            reason.push_str(&format!(
                "Dynamic threshold of {threshold:.2} used (formula: {formula}, based on {reference_field})."
            ));
        }
        (ThresholdSpec::Segment { field, .. }, ThresholdKind::Segment) => {
            let segment_value = customer
                .map(|c| c.text_field(field))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());
            reason.push_str(&format!(
                "Segment-based threshold of {threshold:.2} used (segment: {field}={segment_value})."
            ));
        }
        _ => {
            reason.push_str(&format!("Fixed threshold of {threshold:.2} used."));
        }
    }

    reason
}

// ── Multi-scenario runs ──────────────────────────────────────────────────────

/// Outcome of one run: final alerts (refinements applied), the exclusion
/// audit log, and the scenarios that were skipped with their failure text.
#[derive(Debug, Default)]
pub struct RunReport {
    pub alerts: Vec<Alert>,
    pub exclusion_log: Vec<ExclusionLogEntry>,
    pub executed_scenarios: usize,
    pub skipped_scenarios: Vec<(ScenarioId, String)>,
}

/// Execute every scenario against one bounded dataset, applying each
/// scenario's refinement rules to its own alerts.
///
/// Per-scenario failures are isolated: the scenario is logged and skipped
/// and the run continues. The only fatal condition is an empty transaction
/// set — there is nothing to process at all.
pub fn execute_run(
    configs: &[RuleConfig],
    transactions: &[Record],
    customers: &[Record],
    reference: &ReferenceData,
) -> EngineResult<RunReport> {
    if transactions.is_empty() {
        return Err(EngineError::NoInputData);
    }

    let mut report = RunReport::default();

    for config in configs {
        match execute_scenario(config, transactions, customers, reference) {
            Ok(alerts) => {
                let (alerts, log_entries) =
                    apply_refinements(alerts, transactions, &config.refinements, reference);
                report.alerts.extend(alerts);
                report.exclusion_log.extend(log_entries);
                report.executed_scenarios += 1;
            }
            Err(err) => {
                log::error!("scenario '{}' skipped: {err}", config.id);
                report
                    .skipped_scenarios
                    .push((config.id.clone(), err.to_string()));
            }
        }
    }

    Ok(report)
}
