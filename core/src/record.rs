//! The normalized record model and the read-only reference data snapshot.
//!
//! Uploads arrive with arbitrary column sets, so a record is a small envelope
//! of guaranteed system fields (id, owning customer, timestamp) plus an open
//! field map. Field lookups have explicit not-found semantics — callers decide
//! whether a missing field means "skip", "zero", or "never matches".

use crate::types::CustomerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ── Field values ─────────────────────────────────────────────────────────────

/// A single field value in a schema-free record.
///
/// Untagged: JSON numbers, strings, booleans, and nulls map directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl Value {
    /// Numeric view of the value. Text that parses as a number casts;
    /// booleans and nulls do not.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(_) | Value::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical text rendering, used for raw-value comparison fallback
    /// and narrative output.
    pub fn render(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Value::Text(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

/// A normalized transaction or customer record.
///
/// For transactions `owner_id` is the owning customer's id; for customer
/// records it equals `id`. Immutable once produced by the ingestion caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub owner_id: CustomerId,
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Numeric field extraction for aggregation: missing or unparseable
    /// values are treated as 0 and never raise.
    pub fn numeric_field(&self, name: &str) -> f64 {
        self.field(name).and_then(Value::as_number).unwrap_or(0.0)
    }

    /// Text rendering of a field; empty string when absent.
    pub fn text_field(&self, name: &str) -> String {
        self.field(name).map(Value::render).unwrap_or_default()
    }
}

// ── Schema snapshot ──────────────────────────────────────────────────────────

/// Field-name snapshot taken at run start, used to route filter predicates
/// to transaction or customer data. Fields present only on the customer side
/// auto-route there; everything else resolves against the transaction.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    transaction_fields: BTreeSet<String>,
    customer_fields: BTreeSet<String>,
}

impl FieldSchema {
    pub fn from_records(transactions: &[Record], customers: &[Record]) -> Self {
        let mut schema = FieldSchema::default();
        for txn in transactions {
            schema
                .transaction_fields
                .extend(txn.fields.keys().cloned());
        }
        for cust in customers {
            schema.customer_fields.extend(cust.fields.keys().cloned());
        }
        schema
    }

    pub fn has_transaction_field(&self, field: &str) -> bool {
        self.transaction_fields.contains(field)
    }

    pub fn has_customer_field(&self, field: &str) -> bool {
        self.customer_fields.contains(field)
    }

    /// True when the field exists only in customer data, which auto-routes
    /// a non-prefixed predicate to the customer record.
    pub fn is_customer_only(&self, field: &str) -> bool {
        self.has_customer_field(field) && !self.has_transaction_field(field)
    }

    pub fn is_known(&self, field: &str) -> bool {
        self.has_transaction_field(field) || self.has_customer_field(field)
    }
}

// ── Reference data ───────────────────────────────────────────────────────────

/// A whitelisted counterparty (university, financial institution, exchange).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedEntity {
    pub name: String,
    pub entity_type: String,
    pub active: bool,
}

/// Customer-level risk flags consumed by the risk engine. All flags default
/// to benign; absence of a profile means "nothing adverse known".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerRiskProfile {
    #[serde(default)]
    pub is_pep: bool,
    #[serde(default)]
    pub has_adverse_media: bool,
    #[serde(default)]
    pub high_risk_occupation: bool,
    #[serde(default)]
    pub previous_sar_count: u32,
}

/// Read-only reference snapshot taken at run start and passed into every
/// invocation. Never mutated by the engines; there is no process-wide cache.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub verified_entities: Vec<VerifiedEntity>,
    pub risk_profiles: HashMap<CustomerId, CustomerRiskProfile>,
}

impl ReferenceData {
    /// Whitelist lookup: active entity of the given type whose name contains
    /// the beneficiary name, case-insensitively. An empty beneficiary never
    /// verifies; an empty whitelist simply means "not verified", not an error.
    pub fn is_verified(&self, beneficiary: &str, entity_type: &str) -> bool {
        let needle = beneficiary.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.verified_entities.iter().any(|e| {
            e.active
                && e.entity_type == entity_type
                && e.name.to_lowercase().contains(&needle)
        })
    }

    pub fn risk_profile(&self, customer_id: &str) -> Option<&CustomerRiskProfile> {
        self.risk_profiles.get(customer_id)
    }
}
