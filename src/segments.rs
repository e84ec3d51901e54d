use crate::error::{LedgerBuilderError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One customer's (recency, frequency, monetary) score triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreTriplet {
    pub recency: u8,
    pub frequency: u8,
    pub monetary: u8,
}

impl ScoreTriplet {
    pub fn new(recency: u8, frequency: u8, monetary: u8) -> Self {
        Self {
            recency,
            frequency,
            monetary,
        }
    }

    /// The concatenated three-digit RFM code, e.g. (5,4,5) -> 545. Only
    /// meaningful while scores are single digits, which they are for any
    /// practical bin count.
    pub fn code(&self) -> u16 {
        self.recency as u16 * 100 + self.frequency as u16 * 10 + self.monetary as u16
    }
}

/// Predicate half of a segment rule. Data the classifier iterates, so the
/// business can reshape segments without touching classifier code.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentPredicate {
    /// Per-dimension score bounds; omitted bounds are unconstrained.
    /// "recency at least 4 and frequency at least 4" is
    /// `{min_recency: 4, min_frequency: 4}`.
    Bounds {
        #[serde(default)]
        min_recency: Option<u8>,
        #[serde(default)]
        max_recency: Option<u8>,
        #[serde(default)]
        min_frequency: Option<u8>,
        #[serde(default)]
        max_frequency: Option<u8>,
        #[serde(default)]
        min_monetary: Option<u8>,
        #[serde(default)]
        max_monetary: Option<u8>,
    },

    /// Explicit list of three-digit RFM codes, the way the historical
    /// category tables are written.
    Codes { codes: Vec<u16> },

    /// Matches every triplet. The table must end in one of these.
    CatchAll,
}

impl SegmentPredicate {
    pub fn matches(&self, triplet: ScoreTriplet) -> bool {
        match self {
            SegmentPredicate::Bounds {
                min_recency,
                max_recency,
                min_frequency,
                max_frequency,
                min_monetary,
                max_monetary,
            } => {
                within(triplet.recency, *min_recency, *max_recency)
                    && within(triplet.frequency, *min_frequency, *max_frequency)
                    && within(triplet.monetary, *min_monetary, *max_monetary)
            }
            SegmentPredicate::Codes { codes } => codes.contains(&triplet.code()),
            SegmentPredicate::CatchAll => true,
        }
    }
}

fn within(score: u8, min: Option<u8>, max: Option<u8>) -> bool {
    min.map_or(true, |m| score >= m) && max.map_or(true, |m| score <= m)
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SegmentRule {
    #[schemars(description = "Business segment name this rule assigns")]
    pub label: String,

    #[schemars(description = "Predicate deciding whether a score triplet belongs to this segment")]
    pub predicate: SegmentPredicate,
}

/// Ordered rule table: the first matching rule wins, and the order doubles as
/// segment value ranking (earlier = higher-value segment).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SegmentRuleTable {
    rules: Vec<SegmentRule>,
}

impl SegmentRuleTable {
    pub fn new(rules: Vec<SegmentRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SegmentRule] {
        &self.rules
    }

    /// Fails fast unless every triplet in `{1..=bins}^3` matches some rule.
    /// Runs at configuration time, before any customer is processed.
    pub fn validate(&self, bins: u8) -> Result<()> {
        if self.rules.is_empty() {
            return Err(LedgerBuilderError::EmptyRuleTable);
        }

        for recency in 1..=bins {
            for frequency in 1..=bins {
                for monetary in 1..=bins {
                    let triplet = ScoreTriplet::new(recency, frequency, monetary);
                    if !self.rules.iter().any(|r| r.predicate.matches(triplet)) {
                        return Err(LedgerBuilderError::MissingCatchAllRule(format!(
                            "{}-{}-{}",
                            recency, frequency, monetary
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// First matching rule's label, or `None` for a table without a catch-all
    /// (which `validate` rejects up front).
    pub fn classify(&self, triplet: ScoreTriplet) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.predicate.matches(triplet))
            .map(|r| r.label.as_str())
    }

    /// Position of a label in the table; lower means higher-value segment.
    pub fn priority(&self, label: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.label == label)
    }
}

fn codes_rule(label: &str, codes: &[u16]) -> SegmentRule {
    SegmentRule {
        label: label.to_string(),
        predicate: SegmentPredicate::Codes {
            codes: codes.to_vec(),
        },
    }
}

impl Default for SegmentRuleTable {
    /// The historical eleven-category table, carried over code for code from
    /// the monthly reporting workbooks, plus a terminal catch-all.
    fn default() -> Self {
        Self::new(vec![
            codes_rule("Champions", &[555, 554, 544, 545, 454, 455, 445]),
            codes_rule("Loyal", &[543, 444, 435, 355, 354, 345, 344, 335]),
            codes_rule(
                "Promising",
                &[
                    553, 551, 552, 541, 542, 533, 532, 531, 452, 451, 442, 441, 431, 453, 433,
                    432, 423, 353, 352, 351, 342, 341, 333, 323,
                ],
            ),
            codes_rule("New Customers", &[512, 511, 422, 421, 412, 411, 311]),
            codes_rule(
                "Needs Activation",
                &[
                    525, 524, 523, 522, 521, 515, 514, 513, 425, 424, 413, 414, 415, 315, 314,
                    313,
                ],
            ),
            codes_rule(
                "Needs Attention",
                &[535, 534, 443, 434, 343, 334, 325, 324],
            ),
            codes_rule("Whales", &[155, 154, 144, 214, 215, 115, 114, 113]),
            codes_rule("About To Sleep", &[331, 321, 312, 221, 213]),
            codes_rule(
                "At Risk",
                &[
                    255, 254, 245, 244, 253, 252, 243, 242, 235, 234, 225, 224, 153, 152, 145,
                    143, 142, 135, 134, 133, 125, 124,
                ],
            ),
            codes_rule(
                "Hibernating",
                &[332, 322, 231, 241, 251, 233, 232, 223, 222, 132, 123, 122, 212, 211],
            ),
            codes_rule("Inactive", &[111, 112, 121, 131, 141, 151]),
            SegmentRule {
                label: "Unclassified".to_string(),
                predicate: SegmentPredicate::CatchAll,
            },
        ])
    }
}
