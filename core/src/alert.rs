//! Alert and exclusion-audit data model.
//!
//! An alert is created once per (customer, scenario) per run and mutated at
//! most once afterward, by the refinement layer, to set `excluded` and
//! `exclusion_reason`. Exclusion log entries are append-only: written at the
//! moment of suppression and never edited.

use crate::{
    config::ThresholdKind,
    record::Value,
    types::{CustomerId, RuleId, ScenarioId, TransactionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub customer_id: CustomerId,
    pub scenario_id: ScenarioId,
    /// Timestamp of the last transaction in the winning window. Its date is
    /// part of the run-level dedup key.
    pub window_end_date: DateTime<Utc>,
    pub aggregated_value: f64,
    pub threshold_used: f64,
    pub threshold_type: ThresholdKind,
    pub transaction_count: usize,
    pub involved_transaction_ids: Vec<TransactionId>,
    /// 0..=100.
    pub risk_score: u8,
    /// Generated narrative: aggregation, window, and threshold basis.
    pub reason: String,
    pub severity: String,
    pub excluded: bool,
    pub exclusion_reason: Option<String>,
    /// Open map of trigger facts (aggregation details, and beneficiary when
    /// known). Consumed by the comparison and risk engines.
    #[serde(default)]
    pub trigger_details: BTreeMap<String, Value>,
}

impl Alert {
    /// Text trigger detail, `None` when absent or non-text.
    pub fn detail_text(&self, key: &str) -> Option<&str> {
        self.trigger_details.get(key).and_then(Value::as_text)
    }
}

/// One append-only audit record per (alert, rule) suppression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionLogEntry {
    pub id: String,
    pub alert_id: String,
    pub rule_id: RuleId,
    pub reason: String,
    /// Snapshot of the deciding risk flags at suppression time: event type,
    /// amount, beneficiary, verification result.
    pub risk_flags_snapshot: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}
