//! Rolling-window peak scan: true-maximum property, tie-breaking, and
//! per-function aggregates.

use amlsim_core::aggregation_stage::aggregate_peak_windows;
use amlsim_core::config::{AggFunction, AggregationSpec};
use amlsim_core::record::{Record, Value};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::days(n)
}

fn txn(id: &str, customer: &str, d: i64, amount: f64) -> Record {
    let mut fields = BTreeMap::new();
    fields.insert("transaction_amount".to_string(), Value::Number(amount));
    Record {
        id: id.to_string(),
        owner_id: customer.to_string(),
        timestamp: day(d),
        fields,
    }
}

fn sum_spec(window_days: u32) -> AggregationSpec {
    AggregationSpec {
        field: "transaction_amount".to_string(),
        function: AggFunction::Sum,
        window_days,
    }
}

fn spec(function: AggFunction, window_days: u32) -> AggregationSpec {
    AggregationSpec {
        field: "transaction_amount".to_string(),
        function,
        window_days,
    }
}

/// Brute-force reference: the best window sum starting at each transaction.
fn brute_force_peak_sum(txns: &[(i64, f64)], window_days: i64) -> f64 {
    let mut best = f64::NEG_INFINITY;
    for (i, &(start, _)) in txns.iter().enumerate() {
        let sum: f64 = txns[i..]
            .iter()
            .filter(|(d, _)| *d <= start + window_days)
            .map(|(_, a)| a)
            .sum();
        if sum > best {
            best = sum;
        }
    }
    best
}

#[test]
fn peak_window_is_the_true_maximum() {
    // Irregular spacing and amounts; three bursts of activity.
    let data: Vec<(i64, f64)> = vec![
        (0, 4_000.0),
        (2, 9_500.0),
        (3, 1_200.0),
        (9, 7_700.0),
        (20, 15_000.0),
        (22, 3_300.0),
        (25, 8_800.0),
        (47, 2_000.0),
        (48, 12_500.0),
        (49, 6_100.0),
        (71, 500.0),
        (90, 11_000.0),
    ];
    let txns: Vec<Record> = data
        .iter()
        .enumerate()
        .map(|(i, &(d, a))| txn(&format!("t-{i:03}"), "c-1", d, a))
        .collect();
    let refs: Vec<&Record> = txns.iter().collect();

    for window in [1u32, 7, 14, 30] {
        let result = aggregate_peak_windows(&refs, &sum_spec(window));
        assert_eq!(result.len(), 1);
        let expected = brute_force_peak_sum(&data, i64::from(window));
        assert_eq!(
            result[0].aggregated_value, expected,
            "window={window}: peak should match brute force"
        );
    }
}

#[test]
fn chosen_window_dominates_every_other_window() {
    let data: Vec<(i64, f64)> = vec![
        (0, 1_000.0),
        (5, 2_500.0),
        (6, 2_500.0),
        (12, 400.0),
        (31, 9_000.0),
        (33, 100.0),
        (60, 5_000.0),
    ];
    let txns: Vec<Record> = data
        .iter()
        .enumerate()
        .map(|(i, &(d, a))| txn(&format!("t-{i:03}"), "c-1", d, a))
        .collect();
    let refs: Vec<&Record> = txns.iter().collect();

    let result = aggregate_peak_windows(&refs, &sum_spec(10));
    let peak = result[0].aggregated_value;

    // Every candidate window aggregate must be <= the chosen one.
    for (i, &(start, _)) in data.iter().enumerate() {
        let window_sum: f64 = data[i..]
            .iter()
            .filter(|(d, _)| *d <= start + 10)
            .map(|(_, a)| a)
            .sum();
        assert!(
            peak >= window_sum,
            "window starting at day {start} (sum {window_sum}) beats the chosen peak {peak}"
        );
    }
}

#[test]
fn first_window_wins_ties() {
    // Two disjoint windows with the same sum; the earlier one must be kept.
    let txns = vec![
        txn("t-early", "c-1", 0, 100.0),
        txn("t-late", "c-1", 40, 100.0),
    ];
    let refs: Vec<&Record> = txns.iter().collect();

    let result = aggregate_peak_windows(&refs, &sum_spec(5));
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].aggregated_value, 100.0);
    assert_eq!(result[0].involved_transaction_ids, vec!["t-early"]);
    assert_eq!(
        result[0].window_end_date,
        day(0),
        "the first window reaching the maximum keeps it"
    );
}

#[test]
fn window_ends_are_inclusive() {
    // Day 0 and day 30 both fall inside a 30-day window starting at day 0.
    let txns = vec![
        txn("t-1", "c-1", 0, 50_000.0),
        txn("t-2", "c-1", 30, 50_000.0),
        txn("t-3", "c-1", 31, 10.0),
    ];
    let refs: Vec<&Record> = txns.iter().collect();

    let result = aggregate_peak_windows(&refs, &sum_spec(30));
    assert_eq!(result[0].aggregated_value, 100_000.0);
    assert_eq!(result[0].transaction_count, 2);
    assert_eq!(result[0].window_end_date, day(30));
}

#[test]
fn every_function_aggregates_the_window() {
    let txns = vec![
        txn("t-1", "c-1", 0, 10.0),
        txn("t-2", "c-1", 1, 30.0),
        txn("t-3", "c-1", 2, 20.0),
    ];
    let refs: Vec<&Record> = txns.iter().collect();

    let cases = [
        (AggFunction::Sum, 60.0),
        (AggFunction::Count, 3.0),
        (AggFunction::Avg, 20.0),
        (AggFunction::Max, 30.0),
        (AggFunction::Min, 10.0),
    ];
    for (function, expected) in cases {
        let result = aggregate_peak_windows(&refs, &spec(function, 30));
        assert_eq!(
            result[0].aggregated_value, expected,
            "{} over the full window",
            function.label()
        );
    }
}

#[test]
fn min_picks_the_single_transaction_window() {
    // For `min` the peak is the window whose minimum is largest: the
    // lone 500 transaction outruns any window containing the 5s.
    let txns = vec![
        txn("t-1", "c-1", 0, 5.0),
        txn("t-2", "c-1", 1, 5.0),
        txn("t-3", "c-1", 90, 500.0),
    ];
    let refs: Vec<&Record> = txns.iter().collect();

    let result = aggregate_peak_windows(&refs, &spec(AggFunction::Min, 7));
    assert_eq!(result[0].aggregated_value, 500.0);
    assert_eq!(result[0].involved_transaction_ids, vec!["t-3"]);
}

#[test]
fn unparseable_amounts_count_as_zero() {
    let mut bad = txn("t-bad", "c-1", 1, 0.0);
    bad.fields
        .insert("transaction_amount".to_string(), Value::Text("n/a".to_string()));
    let txns = vec![txn("t-1", "c-1", 0, 700.0), bad];
    let refs: Vec<&Record> = txns.iter().collect();

    let result = aggregate_peak_windows(&refs, &sum_spec(7));
    assert_eq!(result[0].aggregated_value, 700.0);
    assert_eq!(result[0].transaction_count, 2);
}

#[test]
fn groups_are_scanned_independently() {
    let txns = vec![
        txn("t-1", "c-1", 0, 1_000.0),
        txn("t-2", "c-2", 0, 9_000.0),
        txn("t-3", "c-1", 3, 2_000.0),
        txn("t-4", "c-2", 60, 100.0),
    ];
    let refs: Vec<&Record> = txns.iter().collect();

    let result = aggregate_peak_windows(&refs, &sum_spec(7));
    assert_eq!(result.len(), 2);

    let c1 = result.iter().find(|r| r.customer_id == "c-1").unwrap();
    let c2 = result.iter().find(|r| r.customer_id == "c-2").unwrap();
    assert_eq!(c1.aggregated_value, 3_000.0);
    assert_eq!(c2.aggregated_value, 9_000.0, "c-2 peak is its first burst");
}
