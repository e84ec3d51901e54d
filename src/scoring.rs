use crate::error::{LedgerBuilderError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Which end of a metric's distribution deserves the top score.
///
/// Recency is the inverted one: a LOWER raw value (fewer days since the last
/// purchase) maps to a HIGHER score. Frequency and monetary map the natural
/// way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreDirection {
    HigherIsBetter,
    LowerIsBetter,
}

/// Converts one metric's population into ordinal scores 1..=bins by quantile
/// binning.
///
/// The population is sorted ascending by `(value, id)` and split into `bins`
/// contiguous buckets; when the size is not evenly divisible, the remainder
/// goes to the lowest-index buckets (those hold `ceil(n/bins)` members, the
/// rest `floor(n/bins)`). A run of equal values always lands in the bucket of
/// its first member, so tied customers share a score and a population with
/// fewer distinct values than bins collapses to fewer distinct scores.
pub fn quantile_scores<'a>(
    values: &[(&'a str, f64)],
    bins: u8,
    direction: ScoreDirection,
) -> Result<BTreeMap<&'a str, u8>> {
    if bins < 2 {
        return Err(LedgerBuilderError::InvalidBinCount(bins));
    }
    if values.is_empty() {
        return Err(LedgerBuilderError::EmptyPopulation);
    }

    let mut sorted: Vec<(&str, f64)> = values.to_vec();
    sorted.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let n = sorted.len();
    let b = bins as usize;
    let base = n / b;
    let remainder = n % b;

    let mut scores = BTreeMap::new();
    let mut prev: Option<(f64, usize)> = None;

    for (position, (id, value)) in sorted.into_iter().enumerate() {
        let positional_bucket = bucket_for_position(position, base, remainder);

        let bucket = match prev {
            Some((prev_value, prev_bucket)) if prev_value == value => prev_bucket,
            _ => positional_bucket,
        };
        prev = Some((value, bucket));

        let score = match direction {
            ScoreDirection::HigherIsBetter => bucket as u8 + 1,
            ScoreDirection::LowerIsBetter => bins - bucket as u8,
        };
        scores.insert(id, score);
    }

    Ok(scores)
}

/// Bucket index for a 0-based sorted position, with the first `remainder`
/// buckets one member larger.
fn bucket_for_position(position: usize, base: usize, remainder: usize) -> usize {
    let large_span = remainder * (base + 1);
    if position < large_span {
        position / (base + 1)
    } else {
        remainder + (position - large_span) / base
    }
}
