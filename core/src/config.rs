//! Scenario (rule) configuration model.
//!
//! Pure data, deserialized from JSON by the caller and validated once per run
//! via [`RuleConfig::validate`]. Read-only during execution: every stage
//! borrows the config, nothing writes back.

use crate::{
    error::{EngineError, EngineResult},
    record::Value,
    refinement_layer::EventType,
    types::{RuleId, ScenarioId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Filters ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==", alias = "equals")]
    Eq,
    #[serde(rename = "!=", alias = "not_equals")]
    Ne,
    #[serde(rename = ">", alias = "greater_than")]
    Gt,
    #[serde(rename = "<", alias = "less_than")]
    Lt,
    #[serde(rename = ">=", alias = "greater_than_or_equal")]
    Ge,
    #[serde(rename = "<=", alias = "less_than_or_equal")]
    Le,
    #[serde(rename = "in")]
    In,
}

/// Right-hand side of a predicate. `in` accepts a list; a single text value
/// with commas is treated as a comma-separated list for `in` as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(Value),
    Many(Vec<Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub operator: FilterOp,
    pub value: FilterValue,
}

// ── Aggregation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunction {
    Sum,
    Count,
    Avg,
    Max,
    Min,
}

impl AggFunction {
    /// Upper-case label used in alert narratives, e.g. "SUM".
    pub fn label(self) -> &'static str {
        match self {
            AggFunction::Sum => "SUM",
            AggFunction::Count => "COUNT",
            AggFunction::Avg => "AVG",
            AggFunction::Max => "MAX",
            AggFunction::Min => "MIN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// Numeric field the function is applied to. Ignored by `count`.
    pub field: String,
    pub function: AggFunction,
    /// Length of the rolling window, in days. Both window ends inclusive.
    pub window_days: u32,
}

/// Optional minimum transaction count for the winning window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountThreshold {
    pub min_transactions: usize,
}

// ── Thresholds ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentThreshold {
    pub segment: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThresholdSpec {
    Fixed {
        value: f64,
    },
    Dynamic {
        /// Customer field the formula reads, exposed as `reference_field`.
        reference_field: String,
        /// Arithmetic expression over `reference_field`; evaluated in the
        /// sandboxed evaluator, never as code.
        formula: String,
        /// Used whenever the spec is incomplete or evaluation fails.
        fallback: f64,
        #[serde(default)]
        min_threshold: Option<f64>,
        #[serde(default)]
        max_threshold: Option<f64>,
    },
    Segment {
        /// Customer field holding the segment value.
        field: String,
        mapping: Vec<SegmentThreshold>,
        /// Threshold for customers whose segment is not in the mapping.
        /// Unset means fail-closed: those customers can never alert.
        #[serde(default)]
        default: Option<f64>,
    },
}

/// Which threshold family produced a resolved threshold. Carried on the
/// alert so the narrative and downstream reports can state the basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    Fixed,
    Dynamic,
    Segment,
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThresholdKind::Fixed => "fixed",
            ThresholdKind::Dynamic => "dynamic",
            ThresholdKind::Segment => "segment",
        };
        f.write_str(s)
    }
}

// ── Refinements and metadata ─────────────────────────────────────────────────

/// A contextual exclusion rule. Only `event_based` rules are understood;
/// other types are skipped so configs can carry forward-compatible rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementRule {
    pub rule_id: RuleId,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub excluded_events: Vec<EventType>,
}

pub const EVENT_BASED_RULE_TYPE: &str = "event_based";

impl RefinementRule {
    pub fn is_event_based(&self) -> bool {
        self.rule_type == EVENT_BASED_RULE_TYPE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMetadata {
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub auto_escalate: bool,
}

fn default_severity() -> String {
    "MEDIUM".to_string()
}

impl Default for AlertMetadata {
    fn default() -> Self {
        Self {
            severity: default_severity(),
            category: String::new(),
            tags: Vec::new(),
            auto_escalate: false,
        }
    }
}

// ── Scenario config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: ScenarioId,
    pub name: String,
    #[serde(default)]
    pub filters: Vec<FilterPredicate>,
    pub aggregation: AggregationSpec,
    pub threshold: ThresholdSpec,
    #[serde(default)]
    pub count_threshold: Option<CountThreshold>,
    #[serde(default)]
    pub refinements: Vec<RefinementRule>,
    #[serde(default)]
    pub alert_metadata: AlertMetadata,
}

impl RuleConfig {
    /// Validate once on load. A failing config skips the whole scenario,
    /// so only structural impossibilities are rejected here; recoverable
    /// issues (bad formula, empty segment mapping) degrade at runtime.
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(self.invalid("scenario id is empty"));
        }
        if self.aggregation.window_days == 0 {
            return Err(self.invalid("aggregation.window_days must be at least 1"));
        }
        if self.aggregation.function != AggFunction::Count
            && self.aggregation.field.trim().is_empty()
        {
            return Err(self.invalid("aggregation.field is required for non-count functions"));
        }
        if let Some(ct) = &self.count_threshold {
            if ct.min_transactions == 0 {
                return Err(self.invalid("count_threshold.min_transactions must be at least 1"));
            }
        }
        if let ThresholdSpec::Segment { mapping, .. } = &self.threshold {
            if mapping.is_empty() {
                log::warn!(
                    "scenario '{}': segment threshold has an empty mapping; \
                     no customer can alert unless a default is set",
                    self.id
                );
            }
        }
        Ok(())
    }

    fn invalid(&self, message: &str) -> EngineError {
        EngineError::InvalidConfig {
            scenario_id: self.id.clone(),
            message: message.to_string(),
        }
    }
}
