//! Aggregation stage — rolling-window peak scan per customer group.
//!
//! For each group, transactions are sorted by (timestamp, id) and every
//! transaction opens a candidate window `[t_i, t_i + window_days]`, both ends
//! inclusive. The aggregate over each candidate window is computed and the
//! maximum wins; the update comparison is strict `>`, so the FIRST window
//! reaching the maximum keeps it. The winning window is the single worst
//! period for that customer and the only value later stages see.

use crate::{
    config::{AggFunction, AggregationSpec},
    record::Record,
    types::{CustomerId, TransactionId},
};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// The worst same-length window found for one customer group.
#[derive(Debug, Clone)]
pub struct WindowAggregate {
    pub customer_id: CustomerId,
    pub aggregated_value: f64,
    pub involved_transaction_ids: Vec<TransactionId>,
    /// Timestamp of the last transaction inside the winning window.
    pub window_end_date: DateTime<Utc>,
    pub transaction_count: usize,
}

/// Scan every customer group for its peak window. Groups are visited in
/// customer-id order so output is deterministic.
pub fn aggregate_peak_windows(filtered: &[&Record], spec: &AggregationSpec) -> Vec<WindowAggregate> {
    let mut groups: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
    for txn in filtered {
        groups.entry(txn.owner_id.as_str()).or_default().push(txn);
    }

    let window = Duration::days(i64::from(spec.window_days));
    let mut results = Vec::with_capacity(groups.len());

    for (customer_id, mut txns) in groups {
        txns.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut best: Option<Peak> = None;

        for i in 0..txns.len() {
            let window_end = txns[i].timestamp + window;

            let mut values = Vec::new();
            let mut ids = Vec::new();
            let mut last_ts = txns[i].timestamp;
            for txn in &txns[i..] {
                if txn.timestamp > window_end {
                    break;
                }
                values.push(txn.numeric_field(&spec.field));
                ids.push(txn.id.clone());
                last_ts = txn.timestamp;
            }

            let aggregate = apply_function(spec.function, &values);
            // Strict `>`: a later window with an equal value never overwrites
            // the first one that reached the maximum.
            if best.as_ref().is_none_or(|b| aggregate > b.value) {
                best = Some(Peak {
                    value: aggregate,
                    ids,
                    end: last_ts,
                });
            }
        }

        if let Some(peak) = best {
            log::debug!(
                "customer {customer_id}: peak {}={:.2} over {} transactions",
                spec.function.label(),
                peak.value,
                peak.ids.len()
            );
            results.push(WindowAggregate {
                customer_id: customer_id.to_string(),
                aggregated_value: peak.value,
                transaction_count: peak.ids.len(),
                involved_transaction_ids: peak.ids,
                window_end_date: peak.end,
            });
        }
    }

    results
}

struct Peak {
    value: f64,
    ids: Vec<TransactionId>,
    end: DateTime<Utc>,
}

/// Aggregate a non-empty value slice. Missing or unparseable source fields
/// have already been mapped to 0 by `Record::numeric_field`.
fn apply_function(function: AggFunction, values: &[f64]) -> f64 {
    match function {
        AggFunction::Sum => values.iter().sum(),
        AggFunction::Count => values.len() as f64,
        AggFunction::Avg => {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }
        AggFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
    }
}
