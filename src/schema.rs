use crate::error::Result;
use crate::utils::{last_day_of_month, next_period, parse_month_token};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A calendar month reference, the granularity at which batches arrive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct MonthRef {
    pub year: i32,
    /// 1-based calendar month.
    pub month: u32,
}

impl MonthRef {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Resolves a caller-supplied month token ("AGO", "agosto", "8", ...) into
    /// a period within the given year.
    pub fn from_token(year: i32, token: &str, client: &str) -> Result<Self> {
        let month = parse_month_token(token, client)?;
        Ok(Self { year, month })
    }

    pub fn last_day(&self) -> NaiveDate {
        last_day_of_month(self.year, self.month)
    }

    pub fn next(&self) -> Result<Self> {
        let (year, month) = next_period(self.year, self.month)?;
        Ok(Self { year, month })
    }
}

/// One spreadsheet row as the external reader hands it over: column name to
/// cell text, layout entirely up to the source client.
pub type RawRow = BTreeMap<String, String>;

/// One ingestion unit: all raw rows for one client for one month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBatch {
    pub client: String,
    pub period: MonthRef,
    pub rows: Vec<RawRow>,
}

impl RawBatch {
    pub fn new(client: impl Into<String>, period: MonthRef, rows: Vec<RawRow>) -> Self {
        Self {
            client: client.into(),
            period,
            rows,
        }
    }
}

/// Canonical transaction record, the shape everything downstream consumes.
///
/// At least one of `quantity` and `amount` is present; the normalizer rejects
/// rows carrying neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub customer: String,
    /// Client/channel identifier of the source batch.
    pub client: String,
    /// Full precision when the source row carried a parseable date, otherwise
    /// the last day of the batch month.
    pub date: NaiveDate,
    pub invoice: String,
    pub quantity: Option<f64>,
    pub amount: Option<f64>,
}

impl TransactionRecord {
    pub fn monetary_value(&self) -> f64 {
        self.amount.unwrap_or(0.0)
    }
}

/// Per-client column layout. One generic normalization routine applies these
/// instead of one bespoke code path per client.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientColumnMap {
    #[schemars(description = "Client identifier the mapping belongs to, matched against RawBatch.client")]
    pub client: String,

    #[schemars(description = "Column holding the customer identifier (tax id or business name)")]
    pub customer_column: String,

    #[schemars(description = "Column holding the invoice/document identifier used for deduplication")]
    pub invoice_column: String,

    #[serde(default)]
    #[schemars(description = "Column holding the monetary amount. At least one of amount_column and quantity_column must be set.")]
    pub amount_column: Option<String>,

    #[serde(default)]
    #[schemars(description = "Column holding the unit quantity. At least one of amount_column and quantity_column must be set.")]
    pub quantity_column: Option<String>,

    #[serde(default)]
    #[schemars(description = "Column holding the transaction date (YYYY-MM-DD or DD/MM/YYYY). Rows without a parseable date are stamped with the batch month's last day.")]
    pub date_column: Option<String>,

    #[serde(default)]
    #[schemars(description = "Column holding the product reference code, only needed when excluded_references is non-empty")]
    pub reference_column: Option<String>,

    #[serde(default)]
    #[schemars(description = "Product reference codes excluded from the analysis (samples, freight, internal references)")]
    pub excluded_references: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Amounts use comma as the decimal separator (\"1234,56\")")]
    pub decimal_comma: bool,

    #[serde(default)]
    #[schemars(description = "Strip everything from the first '-' in the customer identifier (tax-id verification digit)")]
    pub strip_customer_suffix: bool,
}

impl ClientColumnMap {
    pub fn validate(&self) -> Result<()> {
        use crate::error::LedgerBuilderError::InvalidColumnMap;

        if self.client.trim().is_empty() {
            return Err(InvalidColumnMap {
                client: self.client.clone(),
                details: "client identifier is empty".to_string(),
            });
        }
        if self.customer_column.trim().is_empty() {
            return Err(InvalidColumnMap {
                client: self.client.clone(),
                details: "customer_column is empty".to_string(),
            });
        }
        if self.invoice_column.trim().is_empty() {
            return Err(InvalidColumnMap {
                client: self.client.clone(),
                details: "invoice_column is empty".to_string(),
            });
        }
        if self.amount_column.is_none() && self.quantity_column.is_none() {
            return Err(InvalidColumnMap {
                client: self.client.clone(),
                details: "neither amount_column nor quantity_column is set".to_string(),
            });
        }
        if !self.excluded_references.is_empty() && self.reference_column.is_none() {
            return Err(InvalidColumnMap {
                client: self.client.clone(),
                details: "excluded_references set without a reference_column".to_string(),
            });
        }
        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ClientColumnMap)
    }

    pub fn schema_as_json() -> Result<String> {
        let schema = Self::generate_json_schema();
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

/// How a ledger key collision with differing field values is resolved.
///
/// The policy is deliberately data rather than control flow: the business
/// intent behind re-sent client files is still unconfirmed, so swapping the
/// policy must not touch the merge loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ConflictPolicy {
    #[default]
    #[schemars(description = "The incoming record replaces the stored one. Treats a re-sent file as a correction of the previous send.")]
    LatestBatchWins,

    #[schemars(description = "The record with the larger monetary amount is kept. Alternative policy kept available pending business clarification.")]
    HighestAmountWins,
}

fn default_bins() -> u8 {
    5
}

fn default_monetary_scale() -> f64 {
    1.0
}

/// Run parameters for metric computation, scoring and consolidation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SegmentationParams {
    #[schemars(description = "Reference date for recency: days are counted from each customer's latest transaction up to this date")]
    pub as_of: NaiveDate,

    #[serde(default)]
    #[schemars(description = "Optional trailing-window start; transactions before it are ignored by the metric pass (the ledger itself is untouched)")]
    pub window_start: Option<NaiveDate>,

    #[serde(default = "default_bins")]
    #[schemars(description = "Number of quantile bins per metric, conventionally 5")]
    pub bins: u8,

    #[serde(default = "default_monetary_scale")]
    #[schemars(description = "Divisor applied to monetary totals before scoring, e.g. 1000.0 to report in thousands")]
    pub monetary_scale: f64,

    #[serde(default)]
    #[schemars(description = "Conflict resolution policy applied during consolidation")]
    pub conflict_policy: ConflictPolicy,
}

impl SegmentationParams {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            window_start: None,
            bins: default_bins(),
            monetary_scale: default_monetary_scale(),
            conflict_policy: ConflictPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        use crate::error::LedgerBuilderError;

        if self.bins < 2 {
            return Err(LedgerBuilderError::InvalidBinCount(self.bins));
        }
        if self.monetary_scale <= 0.0 {
            return Err(LedgerBuilderError::InvalidMonetaryScale(
                self.monetary_scale,
            ));
        }
        if let Some(start) = self.window_start {
            if start > self.as_of {
                return Err(LedgerBuilderError::DateError(format!(
                    "window_start {} is after as_of {}",
                    start, self.as_of
                )));
            }
        }
        Ok(())
    }
}
