use crate::ledger::Ledger;
use crate::schema::TransactionRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The slice of ledger history a metric pass looks at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    /// Reference date: recency is counted up to here, and transactions dated
    /// after it are outside the window.
    pub as_of: NaiveDate,
    /// Optional trailing-window start; `None` means the full history.
    pub start: Option<NaiveDate>,
}

impl AnalysisWindow {
    pub fn full_history(as_of: NaiveDate) -> Self {
        Self { as_of, start: None }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date <= self.as_of && self.start.map_or(true, |start| date >= start)
    }
}

/// Raw per-customer RFM metrics, recomputed from the ledger each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub customer: String,
    /// Whole days between the customer's most recent in-window transaction
    /// and the as-of date.
    pub recency_days: i64,
    /// Distinct invoice identifiers in the window.
    pub frequency: u64,
    /// Sum of monetary amounts in the window, after the configured scale
    /// divisor.
    pub monetary: f64,
}

struct Accumulator<'a> {
    last_date: NaiveDate,
    invoices: BTreeSet<&'a str>,
    monetary: f64,
}

/// Computes per-customer metrics over any record set. Customers with zero
/// in-window transactions simply do not appear in the output.
///
/// Pure function of its inputs: same records, window and scale always yield
/// the same result, in customer-id order.
pub fn compute_metrics<'a>(
    records: impl IntoIterator<Item = &'a TransactionRecord>,
    window: &AnalysisWindow,
    monetary_scale: f64,
) -> Vec<CustomerMetrics> {
    let mut by_customer: BTreeMap<&str, Accumulator> = BTreeMap::new();

    for record in records {
        if !window.contains(record.date) {
            continue;
        }

        let acc = by_customer
            .entry(record.customer.as_str())
            .or_insert_with(|| Accumulator {
                last_date: record.date,
                invoices: BTreeSet::new(),
                monetary: 0.0,
            });

        if record.date > acc.last_date {
            acc.last_date = record.date;
        }
        acc.invoices.insert(record.invoice.as_str());
        acc.monetary += record.monetary_value();
    }

    by_customer
        .into_iter()
        .map(|(customer, acc)| CustomerMetrics {
            customer: customer.to_string(),
            recency_days: (window.as_of - acc.last_date).num_days(),
            frequency: acc.invoices.len() as u64,
            monetary: acc.monetary / monetary_scale,
        })
        .collect()
}

/// Convenience pass over the whole ledger.
pub fn compute_ledger_metrics(
    ledger: &Ledger,
    window: &AnalysisWindow,
    monetary_scale: f64,
) -> Vec<CustomerMetrics> {
    compute_metrics(ledger.records(), window, monetary_scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(customer: &str, invoice: &str, amount: f64, date: (i32, u32, u32)) -> TransactionRecord {
        TransactionRecord {
            customer: customer.to_string(),
            client: "003 - WEBSITE".to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            invoice: invoice.to_string(),
            quantity: None,
            amount: Some(amount),
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 31).unwrap()
    }

    #[test]
    fn test_basic_aggregation() {
        let records = vec![
            record("A", "FV-1", 100.0, (2024, 8, 29)),
            record("A", "FV-2", 120.0, (2024, 7, 10)),
            record("A", "FV-3", 80.0, (2024, 6, 1)),
            record("B", "FV-4", 50.0, (2024, 2, 13)),
        ];

        let window = AnalysisWindow::full_history(as_of());
        let metrics = compute_metrics(&records, &window, 1.0);

        assert_eq!(metrics.len(), 2);

        let a = &metrics[0];
        assert_eq!(a.customer, "A");
        assert_eq!(a.recency_days, 2);
        assert_eq!(a.frequency, 3);
        assert!((a.monetary - 300.0).abs() < 1e-9);

        let b = &metrics[1];
        assert_eq!(b.recency_days, 200);
        assert_eq!(b.frequency, 1);
        assert!((b.monetary - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_distinct_invoices_counted_once() {
        // Same invoice from two different clients is two ledger entries but
        // one document id; frequency counts distinct identifiers.
        let mut r1 = record("A", "FV-1", 100.0, (2024, 8, 1));
        let mut r2 = record("A", "FV-1", 100.0, (2024, 8, 1));
        r1.client = "003 - WEBSITE".to_string();
        r2.client = "007 - HOTELES".to_string();

        let window = AnalysisWindow::full_history(as_of());
        let metrics = compute_metrics([&r1, &r2], &window, 1.0);
        assert_eq!(metrics[0].frequency, 1);
        assert!((metrics[0].monetary - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_excludes_out_of_range() {
        let records = vec![
            record("A", "FV-1", 100.0, (2023, 12, 31)),
            record("A", "FV-2", 40.0, (2024, 5, 1)),
            record("A", "FV-3", 70.0, (2024, 9, 15)),
        ];

        let window = AnalysisWindow {
            as_of: as_of(),
            start: NaiveDate::from_ymd_opt(2024, 1, 1),
        };
        let metrics = compute_metrics(&records, &window, 1.0);

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].frequency, 1);
        assert!((metrics[0].monetary - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_customer_fully_outside_window_excluded() {
        let records = vec![record("OLD", "FV-1", 10.0, (2020, 1, 1))];

        let window = AnalysisWindow {
            as_of: as_of(),
            start: NaiveDate::from_ymd_opt(2024, 1, 1),
        };
        assert!(compute_metrics(&records, &window, 1.0).is_empty());
    }

    #[test]
    fn test_monetary_scale() {
        let records = vec![record("A", "FV-1", 250_000.0, (2024, 8, 1))];
        let window = AnalysisWindow::full_history(as_of());

        let metrics = compute_metrics(&records, &window, 1000.0);
        assert!((metrics[0].monetary - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_determinism() {
        let records = vec![
            record("B", "FV-2", 10.0, (2024, 3, 5)),
            record("A", "FV-1", 20.0, (2024, 4, 6)),
            record("C", "FV-3", 30.0, (2024, 5, 7)),
        ];
        let window = AnalysisWindow::full_history(as_of());

        let first = compute_metrics(&records, &window, 1.0);
        let second = compute_metrics(&records, &window, 1.0);
        assert_eq!(first, second);
        assert_eq!(first[0].customer, "A");
    }
}
