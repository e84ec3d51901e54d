use crate::error::Result;
use crate::schema::{ConflictPolicy, MonthRef, TransactionRecord};
use chrono::Datelike;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical identity of a ledger entry. Two records with the same key describe
/// the same document and must not coexist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub customer: String,
    pub client: String,
    pub invoice: String,
}

impl LedgerKey {
    pub fn of(record: &TransactionRecord) -> Self {
        Self {
            customer: record.customer.clone(),
            client: record.client.clone(),
            invoice: record.invoice.clone(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.customer, self.client, self.invoice)
    }
}

/// A key collision that carried differing field values, resolved through the
/// configured policy. Surfaced to the caller and never silently swallowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub key: LedgerKey,
    pub previous: TransactionRecord,
    pub incoming: TransactionRecord,
    /// Whether the incoming record replaced the stored one.
    pub applied: bool,
}

/// Outcome of merging one normalized batch.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub inserted: usize,
    pub unchanged: usize,
    pub corrections: Vec<Correction>,
}

/// The consolidated historical store of canonical transaction records.
///
/// Append-oriented: consolidation runs only add or correct entries, never
/// truncate. An explicit, passable value; persistence lives outside the
/// core, which round-trips the whole store through serde for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "LedgerSnapshot", into = "LedgerSnapshot")]
pub struct Ledger {
    entries: BTreeMap<LedgerKey, TransactionRecord>,
}

/// Wire shape of the ledger: a flat record list, since the key is derivable
/// from each record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerSnapshot {
    records: Vec<TransactionRecord>,
}

impl From<LedgerSnapshot> for Ledger {
    fn from(snapshot: LedgerSnapshot) -> Self {
        let mut ledger = Ledger::new();
        for record in snapshot.records {
            ledger.entries.insert(LedgerKey::of(&record), record);
        }
        ledger
    }
}

impl From<Ledger> for LedgerSnapshot {
    fn from(ledger: Ledger) -> Self {
        LedgerSnapshot {
            records: ledger.entries.into_values().collect(),
        }
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &LedgerKey) -> Option<&TransactionRecord> {
        self.entries.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.entries.values()
    }

    /// Merges a normalized batch. Absent keys insert; identical re-sends are
    /// no-ops, so re-running a batch is idempotent; differing values resolve
    /// through `policy` and are reported as corrections.
    pub fn merge_batch(
        &mut self,
        records: &[TransactionRecord],
        policy: ConflictPolicy,
    ) -> MergeReport {
        let mut report = MergeReport::default();

        for record in records {
            let key = LedgerKey::of(record);

            match self.entries.get(&key) {
                None => {
                    self.entries.insert(key, record.clone());
                    report.inserted += 1;
                }
                Some(existing) if existing == record => {
                    report.unchanged += 1;
                }
                Some(existing) => {
                    let applied = match policy {
                        ConflictPolicy::LatestBatchWins => true,
                        ConflictPolicy::HighestAmountWins => {
                            record.monetary_value() > existing.monetary_value()
                        }
                    };

                    warn!(
                        "Ledger conflict at {}: stored amount {:?}, incoming {:?}, {}",
                        key,
                        existing.amount,
                        record.amount,
                        if applied { "replaced" } else { "kept stored" }
                    );

                    report.corrections.push(Correction {
                        key: key.clone(),
                        previous: existing.clone(),
                        incoming: record.clone(),
                        applied,
                    });

                    if applied {
                        self.entries.insert(key, record.clone());
                    }
                }
            }
        }

        debug!(
            "Merge: {} inserted, {} unchanged, {} corrections ({} records in ledger)",
            report.inserted,
            report.unchanged,
            report.corrections.len(),
            self.entries.len()
        );

        report
    }

    /// The most recent period on record for a client, used to stamp the next
    /// undated batch for that client.
    pub fn latest_period_for_client(&self, client: &str) -> Option<MonthRef> {
        self.records()
            .filter(|r| r.client == client)
            .map(|r| r.date)
            .max()
            .map(|date| MonthRef::new(date.year(), date.month()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
