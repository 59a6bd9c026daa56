//! Filter stage — reduces the transaction set to the scenario's matches.
//!
//! Field resolution order per predicate:
//!   1. `customer.`-prefixed fields always route to the customer record.
//!   2. Fields that exist only in customer data (per the schema snapshot)
//!      auto-route there.
//!   3. Everything else resolves against the transaction.
//!
//! A predicate naming a field unknown to both sides is skipped for the whole
//! run (logged, not fatal). A record missing a known field does not match.

use crate::{
    config::{FilterOp, FilterPredicate, FilterValue},
    record::{FieldSchema, Record, Value},
};
use std::collections::HashMap;

const CUSTOMER_PREFIX: &str = "customer.";

/// Where a predicate's field resolves.
enum FieldRoute {
    Transaction(String),
    Customer(String),
    Skip,
}

fn route_field(field: &str, schema: &FieldSchema) -> FieldRoute {
    if let Some(stripped) = field.strip_prefix(CUSTOMER_PREFIX) {
        return FieldRoute::Customer(stripped.to_string());
    }
    if schema.is_customer_only(field) {
        return FieldRoute::Customer(field.to_string());
    }
    if schema.is_known(field) {
        return FieldRoute::Transaction(field.to_string());
    }
    FieldRoute::Skip
}

/// Apply every predicate to the transaction set. Customer-side fields are
/// read through `customers_by_id` (keyed by the transaction's owner).
pub fn apply_filters<'a>(
    transactions: &'a [Record],
    customers_by_id: &HashMap<&str, &Record>,
    predicates: &[FilterPredicate],
    schema: &FieldSchema,
) -> Vec<&'a Record> {
    // Resolve routing once per predicate, not once per record.
    let routed: Vec<(&FilterPredicate, FieldRoute)> = predicates
        .iter()
        .map(|p| {
            let route = route_field(&p.field, schema);
            if matches!(route, FieldRoute::Skip) {
                log::warn!(
                    "filter field '{}' not found in transaction or customer schema; \
                     predicate skipped",
                    p.field
                );
            }
            (p, route)
        })
        .collect();

    transactions
        .iter()
        .filter(|txn| {
            routed.iter().all(|(predicate, route)| {
                let value = match route {
                    FieldRoute::Skip => return true,
                    FieldRoute::Transaction(name) => txn.field(name),
                    FieldRoute::Customer(name) => customers_by_id
                        .get(txn.owner_id.as_str())
                        .and_then(|c| c.field(name)),
                };
                match value {
                    Some(v) => matches(v, predicate.operator, &predicate.value),
                    // Known field, absent on this record: no match.
                    None => false,
                }
            })
        })
        .collect()
}

fn matches(actual: &Value, op: FilterOp, expected: &FilterValue) -> bool {
    match op {
        FilterOp::Eq => single(expected).is_some_and(|e| values_equal(actual, e)),
        FilterOp::Ne => single(expected).is_some_and(|e| !values_equal(actual, e)),
        FilterOp::Gt => compare(actual, expected, |o| o == std::cmp::Ordering::Greater),
        FilterOp::Lt => compare(actual, expected, |o| o == std::cmp::Ordering::Less),
        FilterOp::Ge => compare(actual, expected, |o| o != std::cmp::Ordering::Less),
        FilterOp::Le => compare(actual, expected, |o| o != std::cmp::Ordering::Greater),
        FilterOp::In => in_candidates(expected)
            .iter()
            .any(|e| values_equal(actual, e)),
    }
}

fn single(expected: &FilterValue) -> Option<&Value> {
    match expected {
        FilterValue::One(v) => Some(v),
        FilterValue::Many(vs) => vs.first(),
    }
}

/// Candidate set for `in`: an explicit list, or a comma-separated text value.
fn in_candidates(expected: &FilterValue) -> Vec<Value> {
    match expected {
        FilterValue::Many(vs) => vs.clone(),
        FilterValue::One(Value::Text(s)) if s.contains(',') => s
            .split(',')
            .map(|part| Value::Text(part.trim().to_string()))
            .collect(),
        FilterValue::One(v) => vec![v.clone()],
    }
}

/// Equality with a numeric-cast attempt on both sides first; falls back to
/// the rendered raw values when either side does not cast.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_number(), expected.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => actual.render() == expected.render(),
    }
}

/// Ordering comparison, numeric first, raw string ordering as fallback.
fn compare(actual: &Value, expected: &FilterValue, check: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    let Some(expected) = single(expected) else {
        return false;
    };
    match (actual.as_number(), expected.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).is_some_and(&check),
        _ => check(actual.render().cmp(&expected.render())),
    }
}
