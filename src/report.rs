use crate::error::{LedgerBuilderError, Result};
use crate::ledger::Correction;
use crate::metrics::CustomerMetrics;
use crate::normalizer::RowIssue;
use crate::segments::{ScoreTriplet, SegmentRuleTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final per-customer output row: raw metrics, quantile scores, RFM code and
/// segment label. Formatting and file emission are the report writer's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerScore {
    pub customer: String,
    /// Client/channel the customer was scored within; quantile boundaries
    /// are relative to this channel's population.
    pub channel: String,
    pub recency_days: i64,
    pub frequency: u64,
    pub monetary: f64,
    pub recency_score: u8,
    pub frequency_score: u8,
    pub monetary_score: u8,
    pub rfm_code: u16,
    pub segment: String,
}

/// A batch the run could not process at all (typically no column mapping
/// registered for its client). Reported, never allowed to block other
/// clients' batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedBatch {
    pub client: String,
    pub reason: String,
}

/// Everything the run recovered from rather than aborted on, for the
/// accompanying manifest the analysts review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunManifest {
    pub skipped_rows: Vec<RowIssue>,
    pub corrections: Vec<Correction>,
    pub failed_batches: Vec<FailedBatch>,
    /// Rows dropped by the excluded-references filter, across all batches.
    pub excluded_rows: usize,
}

impl RunManifest {
    pub fn is_clean(&self) -> bool {
        self.skipped_rows.is_empty()
            && self.corrections.is_empty()
            && self.failed_batches.is_empty()
    }
}

/// Output of one segmentation run: score records plus the manifest of
/// skipped and corrected input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationRun {
    pub scores: Vec<CustomerScore>,
    pub manifest: RunManifest,
}

impl SegmentationRun {
    /// Customers per segment label, a summary the monthly report leads with.
    pub fn segment_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for score in &self.scores {
            *counts.entry(score.segment.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Joins one channel's metrics with the three score maps and classifies each
/// customer. The score maps must cover every customer in `metrics`, which
/// they do by construction when they come from the same population.
pub fn assemble_channel_scores(
    channel: &str,
    metrics: &[CustomerMetrics],
    recency_scores: &BTreeMap<&str, u8>,
    frequency_scores: &BTreeMap<&str, u8>,
    monetary_scores: &BTreeMap<&str, u8>,
    rules: &SegmentRuleTable,
) -> Result<Vec<CustomerScore>> {
    let mut scores = Vec::with_capacity(metrics.len());

    for metric in metrics {
        let customer = metric.customer.as_str();
        let triplet = ScoreTriplet::new(
            score_for(recency_scores, customer)?,
            score_for(frequency_scores, customer)?,
            score_for(monetary_scores, customer)?,
        );

        let segment = rules.classify(triplet).ok_or_else(|| {
            LedgerBuilderError::MissingCatchAllRule(format!(
                "{}-{}-{}",
                triplet.recency, triplet.frequency, triplet.monetary
            ))
        })?;

        scores.push(CustomerScore {
            customer: metric.customer.clone(),
            channel: channel.to_string(),
            recency_days: metric.recency_days,
            frequency: metric.frequency,
            monetary: metric.monetary,
            recency_score: triplet.recency,
            frequency_score: triplet.frequency,
            monetary_score: triplet.monetary,
            rfm_code: triplet.code(),
            segment: segment.to_string(),
        });
    }

    Ok(scores)
}

fn score_for(scores: &BTreeMap<&str, u8>, customer: &str) -> Result<u8> {
    scores
        .get(customer)
        .copied()
        .ok_or(LedgerBuilderError::EmptyPopulation)
}
