use crate::error::Result;
use crate::schema::{ClientColumnMap, MonthRef, RawBatch, RawRow, TransactionRecord};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A raw row that could not be normalized, with enough context for the run
/// manifest. Skipping is per-row: one bad row never aborts its batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowIssue {
    pub client: String,
    pub row_index: usize,
    pub reason: String,
}

/// Output of normalizing one batch: canonical records plus the rows that were
/// skipped and why.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub client: String,
    pub period: MonthRef,
    pub records: Vec<TransactionRecord>,
    pub skipped: Vec<RowIssue>,
    /// Rows dropped by the excluded-references business filter. Intentional
    /// exclusions, so counted rather than reported as issues.
    pub excluded: usize,
}

/// Applies a per-client column mapping to a raw batch, producing canonical
/// transaction records.
///
/// Every emitted record has a non-empty customer and invoice identifier and
/// at least one of quantity/amount; `(client, invoice)` is unique within the
/// output.
pub fn normalize_batch(batch: &RawBatch, map: &ClientColumnMap) -> Result<NormalizedBatch> {
    map.validate()?;

    let fallback_date = batch.period.last_day();
    let mut records = Vec::with_capacity(batch.rows.len());
    let mut skipped = Vec::new();
    let mut excluded = 0usize;
    let mut seen_invoices: BTreeSet<String> = BTreeSet::new();

    for (row_index, row) in batch.rows.iter().enumerate() {
        if is_excluded_reference(row, map) {
            excluded += 1;
            continue;
        }

        match normalize_row(row, map, fallback_date, &batch.client, &mut seen_invoices) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(
                    "Skipping row {} of {} batch {}-{:02}: {}",
                    row_index, batch.client, batch.period.year, batch.period.month, reason
                );
                skipped.push(RowIssue {
                    client: batch.client.clone(),
                    row_index,
                    reason,
                });
            }
        }
    }

    debug!(
        "Normalized {} batch {}-{:02}: {} records, {} skipped, {} excluded",
        batch.client,
        batch.period.year,
        batch.period.month,
        records.len(),
        skipped.len(),
        excluded
    );

    Ok(NormalizedBatch {
        client: batch.client.clone(),
        period: batch.period,
        records,
        skipped,
        excluded,
    })
}

fn is_excluded_reference(row: &RawRow, map: &ClientColumnMap) -> bool {
    let Some(column) = &map.reference_column else {
        return false;
    };
    if map.excluded_references.is_empty() {
        return false;
    }
    match non_empty_cell(row, column) {
        Some(reference) => map
            .excluded_references
            .iter()
            .any(|r| r.trim() == reference),
        None => false,
    }
}

fn normalize_row(
    row: &RawRow,
    map: &ClientColumnMap,
    fallback_date: NaiveDate,
    client: &str,
    seen_invoices: &mut BTreeSet<String>,
) -> std::result::Result<TransactionRecord, String> {
    let customer_raw = non_empty_cell(row, &map.customer_column)
        .ok_or_else(|| format!("missing customer identifier ({})", map.customer_column))?;
    let customer = clean_customer_id(customer_raw, map.strip_customer_suffix);
    if customer.is_empty() {
        return Err(format!(
            "customer identifier is empty after cleaning ({})",
            map.customer_column
        ));
    }

    let invoice = non_empty_cell(row, &map.invoice_column)
        .ok_or_else(|| format!("missing invoice identifier ({})", map.invoice_column))?
        .to_string();

    if seen_invoices.contains(&invoice) {
        return Err(format!("duplicate invoice {} within batch", invoice));
    }

    let amount = parse_optional_value(row, map.amount_column.as_deref(), map.decimal_comma)
        .map_err(|e| format!("amount: {}", e))?;
    let quantity = parse_optional_value(row, map.quantity_column.as_deref(), map.decimal_comma)
        .map_err(|e| format!("quantity: {}", e))?;

    if amount.is_none() && quantity.is_none() {
        return Err("row carries neither a monetary amount nor a quantity".to_string());
    }

    let date = resolve_date(row, map.date_column.as_deref(), fallback_date);

    // Only rows that actually emit claim their invoice id; a skipped row must
    // not shadow a later valid one.
    seen_invoices.insert(invoice.clone());

    Ok(TransactionRecord {
        customer,
        client: client.to_string(),
        date,
        invoice,
        quantity,
        amount,
    })
}

fn non_empty_cell<'a>(row: &'a RawRow, column: &str) -> Option<&'a str> {
    row.get(column).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Drops everything from the first '-' onward, the way the source systems
/// append a verification digit to the tax id.
fn clean_customer_id(raw: &str, strip_suffix: bool) -> String {
    let cleaned = if strip_suffix {
        raw.split('-').next().unwrap_or(raw)
    } else {
        raw
    };
    cleaned.trim().to_string()
}

fn parse_optional_value(
    row: &RawRow,
    column: Option<&str>,
    decimal_comma: bool,
) -> std::result::Result<Option<f64>, String> {
    let Some(column) = column else {
        return Ok(None);
    };
    let Some(cell) = non_empty_cell(row, column) else {
        return Ok(None);
    };

    let normalized = if decimal_comma {
        cell.replace('.', "").replace(',', ".")
    } else {
        cell.replace(',', "")
    };

    let value: f64 = normalized
        .trim()
        .parse()
        .map_err(|_| format!("non-numeric value {:?} in column {}", cell, column))?;

    if value < 0.0 {
        return Err(format!("negative value {} in column {}", value, column));
    }
    Ok(Some(value))
}

fn resolve_date(row: &RawRow, column: Option<&str>, fallback: NaiveDate) -> NaiveDate {
    let Some(column) = column else {
        return fallback;
    };
    let Some(cell) = non_empty_cell(row, column) else {
        return fallback;
    };

    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(cell, format) {
            return date;
        }
    }
    fallback
}
