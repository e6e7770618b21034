use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_core::{DocumentId, MatchResult, Period, SourceKind, Statement, Transaction};

/// Cached state of one statement: the extracted transactions and a parallel
/// list of match results.
///
/// Invariant: `results.len() == transactions.len()` and
/// `results[i].transaction == transactions[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    title: String,
    source_kind: SourceKind,
    transactions: Vec<Transaction>,
    #[serde(default)]
    results: Vec<MatchResult>,
}

impl CacheEntry {
    /// Fresh entry for a just-extracted statement; every slot starts `NotFound`.
    pub fn new(statement: &Statement, transactions: Vec<Transaction>) -> Self {
        let results = transactions.iter().cloned().map(MatchResult::not_found).collect();
        Self {
            title: statement.title.clone(),
            source_kind: statement.source_kind,
            transactions,
            results,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_matched()).count()
    }

    pub fn is_consistent(&self) -> bool {
        self.results.len() == self.transactions.len()
            && self
                .results
                .iter()
                .zip(&self.transactions)
                .all(|(r, tx)| &r.transaction == tx)
    }

    /// Restore the invariant after loading a hand-edited or damaged record.
    /// Results that still describe their slot's transaction are kept; every
    /// other slot is reset to `NotFound`. Returns the number of reset slots.
    pub fn repair(&mut self) -> usize {
        if self.is_consistent() {
            return 0;
        }
        let mut old = std::mem::take(&mut self.results).into_iter();
        let mut reset = 0;
        self.results = self
            .transactions
            .iter()
            .map(|tx| match old.next() {
                Some(r) if &r.transaction == tx => r,
                _ => {
                    reset += 1;
                    MatchResult::not_found(tx.clone())
                }
            })
            .collect();
        reset
    }

    /// Store a match for slot `index`. Only `NotFound → Matched` is allowed,
    /// and only for a result describing that slot's transaction; anything
    /// else is ignored and `false` returned.
    pub fn record_match(&mut self, index: usize, result: MatchResult) -> bool {
        let (Some(slot), Some(tx)) = (self.results.get_mut(index), self.transactions.get(index)) else {
            return false;
        };
        if slot.is_matched() || !result.is_matched() || &result.transaction != tx {
            return false;
        }
        *slot = result;
        true
    }
}

/// Everything cached for one month, keyed by statement document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub period: Period,
    #[serde(default)]
    statements: BTreeMap<DocumentId, CacheEntry>,
}

impl PeriodRecord {
    pub fn new(period: Period) -> Self {
        Self { period, statements: BTreeMap::new() }
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.statements.contains_key(&id)
    }

    pub fn entry(&self, id: DocumentId) -> Option<&CacheEntry> {
        self.statements.get(&id)
    }

    pub fn entry_mut(&mut self, id: DocumentId) -> Option<&mut CacheEntry> {
        self.statements.get_mut(&id)
    }

    pub fn insert(&mut self, id: DocumentId, entry: CacheEntry) {
        self.statements.insert(id, entry);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Repair every entry; returns the total number of reset slots.
    pub fn repair(&mut self) -> usize {
        self.statements.values_mut().map(CacheEntry::repair).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::{MatchStatus, MatchVia, Money};

    fn tx(cents: i64) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            amount: Money::from_cents(cents),
            counterparty: "ACME".to_string(),
            description: String::new(),
            raw_reference: None,
        }
    }

    fn statement() -> Statement {
        Statement {
            document_id: DocumentId(1),
            title: "March".to_string(),
            period: Period::new(2025, 3).unwrap(),
            source_kind: SourceKind::PdfOcr,
            original_file_name: None,
        }
    }

    #[test]
    fn new_entry_is_all_not_found() {
        let entry = CacheEntry::new(&statement(), vec![tx(-100), tx(200)]);
        assert!(entry.is_consistent());
        assert!(entry.results().iter().all(|r| r.status == MatchStatus::NotFound));
        assert_eq!(entry.matched_count(), 0);
    }

    #[test]
    fn record_match_only_upgrades() {
        let mut entry = CacheEntry::new(&statement(), vec![tx(-100)]);
        let first = MatchResult::matched(tx(-100), DocumentId(50), MatchVia::Reference, "A");
        assert!(entry.record_match(0, first));

        let second = MatchResult::matched(tx(-100), DocumentId(60), MatchVia::AmountOnly, "B");
        assert!(!entry.record_match(0, second));
        assert!(!entry.record_match(0, MatchResult::not_found(tx(-100))));
        assert_eq!(entry.results()[0].matched_document_id, Some(DocumentId(50)));
    }

    #[test]
    fn record_match_rejects_foreign_transaction_and_bad_index() {
        let mut entry = CacheEntry::new(&statement(), vec![tx(-100)]);
        let other = MatchResult::matched(tx(-999), DocumentId(50), MatchVia::Reference, "A");
        assert!(!entry.record_match(0, other.clone()));
        assert!(!entry.record_match(5, other));
        assert_eq!(entry.matched_count(), 0);
    }

    #[test]
    fn repair_keeps_valid_prefix_and_pads() {
        let mut entry = CacheEntry::new(&statement(), vec![tx(-100), tx(200), tx(300)]);
        entry.record_match(0, MatchResult::matched(tx(-100), DocumentId(5), MatchVia::Reference, "A"));
        entry.results.truncate(1);
        assert!(!entry.is_consistent());

        assert_eq!(entry.repair(), 2);
        assert!(entry.is_consistent());
        assert_eq!(entry.matched_count(), 1);
    }

    #[test]
    fn repair_resets_mismatched_slot() {
        let mut entry = CacheEntry::new(&statement(), vec![tx(-100)]);
        entry.results[0] = MatchResult::matched(tx(-1), DocumentId(5), MatchVia::Reference, "A");
        assert_eq!(entry.repair(), 1);
        assert_eq!(entry.results()[0].status, MatchStatus::NotFound);
    }

    #[test]
    fn record_serializes_statement_ids_as_keys() {
        let mut record = PeriodRecord::new(Period::new(2025, 3).unwrap());
        record.insert(DocumentId(42), CacheEntry::new(&statement(), vec![tx(-100)]));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["statements"]["42"].is_object());
        assert_eq!(json["period"]["month"], 3);

        let back: PeriodRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
