//! # Retail Ledger Builder
//!
//! A library for consolidating key-account sales batches (one spreadsheet
//! export per client per month, each with its own column layout) into a
//! canonical historical ledger, and segmenting customers with RFM
//! (Recency, Frequency, Monetary) scoring.
//!
//! ## Core Concepts
//!
//! - **Raw Batch**: all rows for one client for one month, as the external
//!   file reader hands them over
//! - **Column Map**: per-client configuration naming which columns hold the
//!   customer id, invoice id, amount and date
//! - **Ledger**: the consolidated history, keyed by (customer, client,
//!   invoice); re-running a batch is idempotent, conflicting re-sends are
//!   resolved by policy and reported as corrections
//! - **RFM Scores**: per-channel quantile scores 1..=5 over each customer's
//!   recency, frequency and monetary metrics; population-relative, so they
//!   can shift between runs even for an unchanged customer
//! - **Segments**: named categories assigned by an ordered rule table
//!   (first match wins, catch-all required)
//!
//! ## Example
//!
//! ```rust,ignore
//! use retail_ledger_builder::*;
//! use chrono::NaiveDate;
//!
//! let maps = vec![ClientColumnMap {
//!     client: "FARMATODO COLOMBIA SA".to_string(),
//!     customer_column: "nit".to_string(),
//!     invoice_column: "documento".to_string(),
//!     amount_column: Some("valor".to_string()),
//!     quantity_column: None,
//!     date_column: Some("fecha".to_string()),
//!     reference_column: None,
//!     excluded_references: Vec::new(),
//!     decimal_comma: true,
//!     strip_customer_suffix: true,
//! }];
//!
//! let params = SegmentationParams::new(NaiveDate::from_ymd_opt(2024, 8, 31).unwrap());
//! let engine = SegmentationEngine::new(maps, SegmentRuleTable::default(), params)?;
//!
//! let mut ledger = Ledger::new();
//! let run = engine.run(&batches, &mut ledger)?;
//! println!("{:?}", run.segment_counts());
//! ```

pub mod error;
pub mod ledger;
pub mod metrics;
pub mod normalizer;
pub mod report;
pub mod schema;
pub mod scoring;
pub mod segments;
pub mod utils;

pub use error::{LedgerBuilderError, Result};
pub use ledger::{Correction, Ledger, LedgerKey, MergeReport};
pub use metrics::{compute_ledger_metrics, compute_metrics, AnalysisWindow, CustomerMetrics};
pub use normalizer::{normalize_batch, NormalizedBatch, RowIssue};
pub use report::{CustomerScore, FailedBatch, RunManifest, SegmentationRun};
pub use schema::*;
pub use scoring::{quantile_scores, ScoreDirection};
pub use segments::{ScoreTriplet, SegmentPredicate, SegmentRule, SegmentRuleTable};

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// The monthly pipeline: normalize heterogeneous batches, consolidate them
/// into the ledger, then score and segment each channel's customers.
///
/// Construction validates all configuration up front; a constructed engine
/// cannot fail on configuration mid-run.
pub struct SegmentationEngine {
    column_maps: BTreeMap<String, ClientColumnMap>,
    rules: SegmentRuleTable,
    params: SegmentationParams,
}

impl SegmentationEngine {
    pub fn new(
        column_maps: Vec<ClientColumnMap>,
        rules: SegmentRuleTable,
        params: SegmentationParams,
    ) -> Result<Self> {
        params.validate()?;
        rules.validate(params.bins)?;

        let mut maps = BTreeMap::new();
        for map in column_maps {
            map.validate()?;
            maps.insert(map.client.clone(), map);
        }

        Ok(Self {
            column_maps: maps,
            rules,
            params,
        })
    }

    /// Runs the full pipeline against `batches`, consolidating into `ledger`.
    ///
    /// Per-row problems and per-batch problems are recovered and reported in
    /// the run manifest; the only fatal outcomes are an empty customer
    /// population after windowing and configuration-level failures. Ledger
    /// mutations from the consolidation step are kept even when scoring
    /// fails.
    pub fn run(&self, batches: &[RawBatch], ledger: &mut Ledger) -> Result<SegmentationRun> {
        info!(
            "Segmentation run: {} batches, as-of {}, {} bins",
            batches.len(),
            self.params.as_of,
            self.params.bins
        );

        let mut manifest = RunManifest::default();

        // Normalize each client's batch independently; one client's broken
        // file must not block the others.
        let mut normalized: Vec<NormalizedBatch> = Vec::new();
        for batch in batches {
            let Some(map) = self.column_maps.get(&batch.client) else {
                warn!("No column mapping for client {}, batch skipped", batch.client);
                manifest.failed_batches.push(FailedBatch {
                    client: batch.client.clone(),
                    reason: LedgerBuilderError::UnknownClient(batch.client.clone()).to_string(),
                });
                continue;
            };

            match normalize_batch(batch, map) {
                Ok(result) => normalized.push(result),
                Err(e) => {
                    warn!("Batch for client {} failed wholesale: {}", batch.client, e);
                    manifest.failed_batches.push(FailedBatch {
                        client: batch.client.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for batch in &mut normalized {
            manifest.skipped_rows.append(&mut batch.skipped);
            manifest.excluded_rows += batch.excluded;
        }

        for batch in &normalized {
            let report = ledger.merge_batch(&batch.records, self.params.conflict_policy);
            manifest.corrections.extend(report.corrections);
        }

        let scores = self.score_ledger(ledger)?;

        info!(
            "Run complete: {} score records, {} skipped rows, {} corrections, {} failed batches",
            scores.len(),
            manifest.skipped_rows.len(),
            manifest.corrections.len(),
            manifest.failed_batches.len()
        );

        Ok(SegmentationRun { scores, manifest })
    }

    /// Scoring pass only: metrics, quantile scores and segments per channel,
    /// over the current ledger snapshot. Read-only.
    pub fn score_ledger(&self, ledger: &Ledger) -> Result<Vec<CustomerScore>> {
        let window = AnalysisWindow {
            as_of: self.params.as_of,
            start: self.params.window_start,
        };

        let channels: BTreeSet<&str> = ledger.records().map(|r| r.client.as_str()).collect();

        let mut scores = Vec::new();
        for channel in channels {
            let records: Vec<&TransactionRecord> = ledger
                .records()
                .filter(|r| r.client == channel)
                .collect();

            let metrics = compute_metrics(records, &window, self.params.monetary_scale);
            if metrics.is_empty() {
                debug!("Channel {} has no customers in the window, skipped", channel);
                continue;
            }

            scores.extend(self.score_channel(channel, &metrics)?);
        }

        if scores.is_empty() {
            return Err(LedgerBuilderError::EmptyPopulation);
        }
        Ok(scores)
    }

    fn score_channel(
        &self,
        channel: &str,
        metrics: &[CustomerMetrics],
    ) -> Result<Vec<CustomerScore>> {
        let recency: Vec<(&str, f64)> = metrics
            .iter()
            .map(|m| (m.customer.as_str(), m.recency_days as f64))
            .collect();
        let frequency: Vec<(&str, f64)> = metrics
            .iter()
            .map(|m| (m.customer.as_str(), m.frequency as f64))
            .collect();
        let monetary: Vec<(&str, f64)> = metrics
            .iter()
            .map(|m| (m.customer.as_str(), m.monetary))
            .collect();

        let bins = self.params.bins;
        let recency_scores = quantile_scores(&recency, bins, ScoreDirection::LowerIsBetter)?;
        let frequency_scores = quantile_scores(&frequency, bins, ScoreDirection::HigherIsBetter)?;
        let monetary_scores = quantile_scores(&monetary, bins, ScoreDirection::HigherIsBetter)?;

        debug!("Scored channel {}: {} customers", channel, metrics.len());

        report::assemble_channel_scores(
            channel,
            metrics,
            &recency_scores,
            &frequency_scores,
            &monetary_scores,
            &self.rules,
        )
    }
}

/// One-shot wrapper for callers that don't hold an engine.
pub fn run_segmentation(
    batches: &[RawBatch],
    ledger: &mut Ledger,
    column_maps: Vec<ClientColumnMap>,
    rules: SegmentRuleTable,
    params: SegmentationParams,
) -> Result<SegmentationRun> {
    SegmentationEngine::new(column_maps, rules, params)?.run(batches, ledger)
}
