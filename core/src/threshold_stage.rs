//! Threshold stage — resolves a per-customer numeric threshold.
//!
//! Fail-closed semantics throughout: a dynamic formula that cannot be
//! evaluated falls back to its configured fallback, and a segment value with
//! no mapping entry (and no default) yields an infinite threshold, so that
//! customer can never alert under the scenario. Neither case is an error.

use crate::{
    config::{ThresholdKind, ThresholdSpec},
    formula,
    record::Record,
};

/// Resolve the threshold for one customer group. `customer` is the customer
/// record when the caller has one; dynamic and segment thresholds degrade
/// gracefully without it.
pub fn resolve_threshold(spec: &ThresholdSpec, customer: Option<&Record>) -> (f64, ThresholdKind) {
    match spec {
        ThresholdSpec::Fixed { value } => (*value, ThresholdKind::Fixed),
        ThresholdSpec::Dynamic {
            reference_field,
            formula: expression,
            fallback,
            min_threshold,
            max_threshold,
        } => (
            resolve_dynamic(
                reference_field,
                expression,
                *fallback,
                *min_threshold,
                *max_threshold,
                customer,
            ),
            ThresholdKind::Dynamic,
        ),
        ThresholdSpec::Segment {
            field,
            mapping,
            default,
        } => (resolve_segment(field, mapping, *default, customer), ThresholdKind::Segment),
    }
}

fn resolve_dynamic(
    reference_field: &str,
    expression: &str,
    fallback: f64,
    min_threshold: Option<f64>,
    max_threshold: Option<f64>,
    customer: Option<&Record>,
) -> f64 {
    // An incomplete spec falls back outright.
    if reference_field.trim().is_empty() || expression.trim().is_empty() {
        return fallback;
    }
    let Some(customer) = customer else {
        return fallback;
    };

    // A customer lacking the reference field evaluates against 0; only
    // evaluation failures fall back.
    let reference_value = customer.numeric_field(reference_field);

    match formula::evaluate(expression, reference_value) {
        Ok(mut result) => {
            if let Some(min) = min_threshold {
                result = result.max(min);
            }
            if let Some(max) = max_threshold {
                result = result.min(max);
            }
            result.max(0.0)
        }
        Err(err) => {
            log::warn!(
                "dynamic threshold formula '{expression}' failed ({err}); \
                 using fallback {fallback}"
            );
            fallback
        }
    }
}

fn resolve_segment(
    field: &str,
    mapping: &[crate::config::SegmentThreshold],
    default: Option<f64>,
    customer: Option<&Record>,
) -> f64 {
    let customer_segment = customer
        .map(|c| c.text_field(field))
        .unwrap_or_default();
    let customer_segment = customer_segment.trim();

    if !customer_segment.is_empty() {
        for entry in mapping {
            if entry.segment.trim().eq_ignore_ascii_case(customer_segment) {
                return entry.threshold;
            }
        }
    }

    // No match: the default when configured, otherwise infinite — the
    // documented never-alert outcome for unmapped segments.
    default.unwrap_or(f64::INFINITY)
}
